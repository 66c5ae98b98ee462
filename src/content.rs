//! Content position mapping between spoken text and the rendering surface.
//!
//! The engine speaks a linearized form of whatever the surface currently
//! renders. [`ContentMap::index`] walks the surface once per utterance and
//! produces that linearized text together with an index from global byte
//! offsets back to the surface's own fragments, so a word timing can be
//! turned into highlight coordinates the surface understands. The surface
//! may restructure mid-utterance; [`ContentMap::revalidate`] detects that,
//! and callers disable highlighting rather than risk marking the wrong
//! fragment.

use std::ops::Range;

/// A live rendering surface the engine can walk.
///
/// Implementors enumerate addressable text-bearing fragments in document
/// order together with their raw text, skipping regions that are not
/// rendered. The engine never mutates fragments; it records handles and
/// byte ranges into the raw text it was shown.
pub trait ContentSurface {
    /// Opaque handle to one addressable fragment, owned by the surface.
    type Fragment: Clone + PartialEq;

    /// Visit every text-bearing fragment in document order.
    fn for_each_fragment(&self, visit: &mut dyn FnMut(Self::Fragment, &str));
}

/// A resolved slice of one surface fragment.
///
/// `start..end` is a byte range into the fragment's raw text as observed at
/// indexing time; the surface turns it into a visible highlight.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpan<F> {
    pub fragment: F,
    pub start: usize,
    pub end: usize,
}

/// One contiguous run of spoken-text bytes backed by raw fragment bytes.
///
/// `len == raw_len` for literal runs; a collapsed whitespace run is a
/// single spoken space (`len == 1`) backed by the whole raw run.
#[derive(Debug, Clone, Copy)]
struct Segment {
    global_start: usize,
    len: usize,
    raw_start: usize,
    raw_len: usize,
}

struct IndexEntry<F> {
    fragment: F,
    global_start: usize,
    global_end: usize,
    segments: Vec<Segment>,
}

impl<F: Clone> IndexEntry<F> {
    /// Map the global byte range `lo..hi` (already clipped to this entry)
    /// onto a raw-text byte range of the fragment.
    fn raw_range(&self, lo: usize, hi: usize) -> Option<(usize, usize)> {
        let mut start = None;
        let mut end = None;

        for seg in &self.segments {
            let seg_end = seg.global_start + seg.len;
            if seg_end <= lo {
                continue;
            }
            if seg.global_start >= hi {
                break;
            }

            let from = lo.max(seg.global_start) - seg.global_start;
            let to = hi.min(seg_end) - seg.global_start;
            let (raw_from, raw_to) = if seg.len == seg.raw_len {
                (seg.raw_start + from, seg.raw_start + to)
            } else {
                // Collapsed whitespace: any touch covers the whole raw run.
                (seg.raw_start, seg.raw_start + seg.raw_len)
            };

            if start.is_none() {
                start = Some(raw_from);
            }
            end = Some(raw_to);
        }

        Some((start?, end?))
    }
}

/// Bidirectional index between linearized spoken text and the surface
/// fragments it was read from.
///
/// Whitespace runs collapse to single spaces, leading and trailing runs are
/// dropped, and fragments that contribute no spoken text are skipped. The
/// index partitions the spoken text: fragment coverage is ordered, gap-free
/// and overlap-free.
pub struct ContentMap<F> {
    spoken_text: String,
    entries: Vec<IndexEntry<F>>,
}

impl<F: Clone + PartialEq> ContentMap<F> {
    /// Walk the surface and build the index.
    pub fn index(surface: &dyn ContentSurface<Fragment = F>) -> Self {
        let (spoken_text, entries) = build(surface);
        log::debug!(
            "Indexed {} fragments covering {} bytes of spoken text",
            entries.len(),
            spoken_text.len()
        );
        Self {
            spoken_text,
            entries,
        }
    }

    /// The linearized text this map was built from, exactly as it should be
    /// handed to a synthesis provider.
    pub fn spoken_text(&self) -> &str {
        &self.spoken_text
    }

    pub fn is_empty(&self) -> bool {
        self.spoken_text.is_empty()
    }

    /// Ordered fragment coverage of the spoken text.
    pub fn coverage(&self) -> impl Iterator<Item = (&F, Range<usize>)> + '_ {
        self.entries
            .iter()
            .map(|entry| (&entry.fragment, entry.global_start..entry.global_end))
    }

    /// Resolve a spoken-text byte range to the fragments it touches, in
    /// order, each with a local raw-text byte range.
    ///
    /// A single word may straddle fragment boundaries, so the result can
    /// hold more than one span; together they cover the range with no gap.
    /// A range outside the indexed text yields an empty list, not an error.
    pub fn resolve(&self, char_offset: usize, length: usize) -> Vec<FragmentSpan<F>> {
        if length == 0 || char_offset >= self.spoken_text.len() {
            return Vec::new();
        }
        let end = char_offset
            .saturating_add(length)
            .min(self.spoken_text.len());

        let first = self
            .entries
            .partition_point(|entry| entry.global_end <= char_offset);

        let mut spans = Vec::new();
        for entry in &self.entries[first..] {
            if entry.global_start >= end {
                break;
            }
            let lo = char_offset.max(entry.global_start);
            let hi = end.min(entry.global_end);
            if let Some((start, raw_end)) = entry.raw_range(lo, hi) {
                spans.push(FragmentSpan {
                    fragment: entry.fragment.clone(),
                    start,
                    end: raw_end,
                });
            }
        }
        spans
    }

    /// Recompute the linearized text from the live surface and compare it
    /// byte-for-byte to the text this map was built from.
    ///
    /// `false` means the surface changed since indexing and the map can no
    /// longer be trusted; callers must stop highlighting for the rest of
    /// the utterance. Silent misattribution is worse than no highlight.
    pub fn revalidate(&self, surface: &dyn ContentSurface<Fragment = F>) -> bool {
        let (fresh, _) = build(surface);
        if fresh != self.spoken_text {
            log::warn!(
                "spoken content changed since indexing ({} -> {} bytes)",
                self.spoken_text.len(),
                fresh.len()
            );
            return false;
        }
        true
    }
}

/// Where a not-yet-emitted collapsed space will land once a following
/// non-whitespace character forces it out.
enum Attach {
    /// The run began in the fragment currently being walked.
    CurrentFragment,
    /// The run began in the most recently indexed fragment.
    LastEntry,
    /// The run began in a fragment that contributed nothing else.
    Detached,
}

struct PendingSpace<F> {
    fragment: F,
    raw_start: usize,
    raw_len: usize,
    attach: Attach,
}

struct MapBuilder<F> {
    spoken: String,
    entries: Vec<IndexEntry<F>>,
    pending: Option<PendingSpace<F>>,
}

fn build<F: Clone + PartialEq>(
    surface: &dyn ContentSurface<Fragment = F>,
) -> (String, Vec<IndexEntry<F>>) {
    let mut builder = MapBuilder {
        spoken: String::new(),
        entries: Vec::new(),
        pending: None,
    };
    surface.for_each_fragment(&mut |fragment, raw| builder.push_fragment(fragment, raw));
    // A trailing whitespace run is never emitted.
    builder.pending = None;

    debug_assert_eq!(
        builder.entries.last().map(|e| e.global_end).unwrap_or(0),
        builder.spoken.len()
    );
    (builder.spoken, builder.entries)
}

impl<F: Clone + PartialEq> MapBuilder<F> {
    fn push_fragment(&mut self, fragment: F, raw: &str) {
        let mut segments: Vec<Segment> = Vec::new();
        let mut run: Option<Segment> = None;

        for (idx, ch) in raw.char_indices() {
            if ch.is_whitespace() {
                if let Some(seg) = run.take() {
                    segments.push(seg);
                }
                if self.spoken.is_empty() {
                    // Leading whitespace of the document is dropped.
                    continue;
                }
                match &mut self.pending {
                    None => {
                        self.pending = Some(PendingSpace {
                            fragment: fragment.clone(),
                            raw_start: idx,
                            raw_len: ch.len_utf8(),
                            attach: Attach::CurrentFragment,
                        });
                    }
                    Some(pending) => {
                        // The raw extent of a run is capped at the fragment
                        // it began in; continuation in later fragments only
                        // keeps the run alive.
                        if matches!(pending.attach, Attach::CurrentFragment) {
                            pending.raw_len += ch.len_utf8();
                        }
                    }
                }
                continue;
            }

            if let Some(pending) = self.pending.take() {
                self.emit_space(pending, &mut segments);
            }

            match &mut run {
                Some(seg) => {
                    seg.len += ch.len_utf8();
                    seg.raw_len += ch.len_utf8();
                }
                None => {
                    run = Some(Segment {
                        global_start: self.spoken.len(),
                        len: ch.len_utf8(),
                        raw_start: idx,
                        raw_len: ch.len_utf8(),
                    });
                }
            }
            self.spoken.push(ch);
        }

        if let Some(seg) = run.take() {
            segments.push(seg);
        }

        let contributed = !segments.is_empty();
        if contributed {
            let global_start = segments[0].global_start;
            self.entries.push(IndexEntry {
                fragment: fragment.clone(),
                global_start,
                global_end: self.spoken.len(),
                segments,
            });
        }

        // A space run that began here and is still open gets re-attached
        // now that this fragment's walk is over.
        if let Some(pending) = &mut self.pending {
            if matches!(pending.attach, Attach::CurrentFragment) {
                pending.attach = if contributed {
                    Attach::LastEntry
                } else {
                    Attach::Detached
                };
            }
        }
    }

    fn emit_space(&mut self, pending: PendingSpace<F>, segments: &mut Vec<Segment>) {
        let space = Segment {
            global_start: self.spoken.len(),
            len: 1,
            raw_start: pending.raw_start,
            raw_len: pending.raw_len,
        };
        self.spoken.push(' ');

        match pending.attach {
            Attach::CurrentFragment => segments.push(space),
            Attach::LastEntry => {
                if let Some(entry) = self.entries.last_mut() {
                    entry.segments.push(space);
                    entry.global_end += 1;
                }
            }
            Attach::Detached => {
                self.entries.push(IndexEntry {
                    fragment: pending.fragment,
                    global_start: space.global_start,
                    global_end: space.global_start + 1,
                    segments: vec![space],
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentMap, ContentSurface, FragmentSpan};

    struct TestSurface {
        fragments: Vec<(u32, String)>,
    }

    impl ContentSurface for TestSurface {
        type Fragment = u32;

        fn for_each_fragment(&self, visit: &mut dyn FnMut(u32, &str)) {
            for (id, text) in &self.fragments {
                visit(*id, text);
            }
        }
    }

    fn surface(fragments: &[(u32, &str)]) -> TestSurface {
        TestSurface {
            fragments: fragments
                .iter()
                .map(|(id, text)| (*id, text.to_string()))
                .collect(),
        }
    }

    fn span(fragment: u32, start: usize, end: usize) -> FragmentSpan<u32> {
        FragmentSpan {
            fragment,
            start,
            end,
        }
    }

    #[test]
    fn coverage_concatenation_round_trips_spoken_text() {
        let surface = surface(&[
            (1, "  The quick "),
            (2, ""),
            (3, "brown\n\tfox "),
            (4, "   "),
            (5, "jumps.  "),
        ]);
        let map = ContentMap::index(&surface);

        assert_eq!(map.spoken_text(), "The quick brown fox jumps.");

        let mut rebuilt = String::new();
        let mut covered = 0;
        for (_, range) in map.coverage() {
            assert_eq!(range.start, covered, "coverage must be gap-free");
            rebuilt.push_str(&map.spoken_text()[range.clone()]);
            covered = range.end;
        }
        assert_eq!(rebuilt, map.spoken_text());
        assert_eq!(covered, map.spoken_text().len());
    }

    #[test]
    fn collapses_interior_whitespace_runs() {
        let map = ContentMap::index(&surface(&[(1, "Hello \n\t world")]));
        assert_eq!(map.spoken_text(), "Hello world");
    }

    #[test]
    fn empty_surface_yields_empty_map() {
        let map = ContentMap::index(&surface(&[]));
        assert!(map.is_empty());
        assert!(map.resolve(0, 5).is_empty());
        let map = ContentMap::index(&surface(&[(1, "   "), (2, "\n")]));
        assert!(map.is_empty());
    }

    #[test]
    fn resolve_inside_one_fragment_returns_one_span() {
        let map = ContentMap::index(&surface(&[(1, "Hello world")]));
        assert_eq!(map.resolve(6, 5), vec![span(1, 6, 11)]);
    }

    #[test]
    fn resolve_straddling_word_returns_covering_spans() {
        // Inline formatting split the word "Hello" across two fragments.
        let map = ContentMap::index(&surface(&[(1, "Hel"), (2, "lo world")]));
        assert_eq!(map.spoken_text(), "Hello world");
        assert_eq!(map.resolve(0, 5), vec![span(1, 0, 3), span(2, 0, 2)]);
    }

    #[test]
    fn resolve_maps_collapsed_space_to_raw_whitespace_run() {
        let map = ContentMap::index(&surface(&[(1, "Hello \n world")]));
        assert_eq!(map.resolve(5, 1), vec![span(1, 5, 8)]);
        // A range crossing the space still comes back as one span.
        assert_eq!(map.resolve(0, 11), vec![span(1, 0, 13)]);
    }

    #[test]
    fn space_at_fragment_boundary_belongs_to_the_run_origin() {
        let map = ContentMap::index(&surface(&[(1, "Hello "), (2, " world")]));
        assert_eq!(map.spoken_text(), "Hello world");

        let coverage: Vec<(u32, std::ops::Range<usize>)> = map
            .coverage()
            .map(|(fragment, range)| (*fragment, range))
            .collect();
        assert_eq!(coverage, vec![(1, 0..6), (2, 6..11)]);
    }

    #[test]
    fn whitespace_only_fragment_carries_its_own_space() {
        let map = ContentMap::index(&surface(&[(1, "Hello"), (2, "  "), (3, "world")]));
        assert_eq!(map.spoken_text(), "Hello world");

        let coverage: Vec<(u32, std::ops::Range<usize>)> = map
            .coverage()
            .map(|(fragment, range)| (*fragment, range))
            .collect();
        assert_eq!(coverage, vec![(1, 0..5), (2, 5..6), (3, 6..11)]);
        assert_eq!(map.resolve(5, 1), vec![span(2, 0, 2)]);
    }

    #[test]
    fn resolve_outside_indexed_text_is_empty() {
        let map = ContentMap::index(&surface(&[(1, "Hello world")]));
        assert!(map.resolve(11, 4).is_empty());
        assert!(map.resolve(100, 1).is_empty());
        assert!(map.resolve(3, 0).is_empty());
    }

    #[test]
    fn resolve_clamps_ranges_past_the_end() {
        let map = ContentMap::index(&surface(&[(1, "Hello world")]));
        assert_eq!(map.resolve(6, 100), vec![span(1, 6, 11)]);
    }

    #[test]
    fn resolve_handles_multibyte_text() {
        let map = ContentMap::index(&surface(&[(1, "héllo wörld")]));
        assert_eq!(map.resolve(7, 6), vec![span(1, 7, 13)]);
        assert_eq!(&"héllo wörld"[7..13], "wörld");
    }

    #[test]
    fn revalidate_accepts_unchanged_surface() {
        let stable = surface(&[(1, "Hello "), (2, "world")]);
        let map = ContentMap::index(&stable);
        assert!(map.revalidate(&stable));
    }

    #[test]
    fn revalidate_rejects_mutated_surface() {
        let before = surface(&[(1, "Hello "), (2, "world")]);
        let map = ContentMap::index(&before);

        let after = surface(&[(1, "Hello "), (2, "there")]);
        assert!(!map.revalidate(&after));
    }

    #[test]
    fn revalidate_tolerates_restructure_preserving_text() {
        let before = surface(&[(1, "Hello world")]);
        let map = ContentMap::index(&before);

        let after = surface(&[(1, "Hello "), (2, "world")]);
        assert!(map.revalidate(&after));
    }
}
