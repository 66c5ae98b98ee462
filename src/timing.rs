//! Word timing acquisition and estimation.
//!
//! Synthesis backends that expose word-level timing do so as a stream of
//! [`SpeechMark`] events; [`parse_marks`] normalizes those into
//! [`WordTiming`] entries. When a backend reports no timing at all,
//! [`estimate`] fabricates approximate timings from the text and a
//! words-per-minute rate so highlighting degrades to "roughly in step"
//! instead of disappearing. Downstream consumers are indifferent to which
//! path produced their timings.

use serde::{Deserialize, Serialize};

/// Default speaking rate assumed by [`estimate`], in words per minute.
pub const DEFAULT_WPM: u32 = 150;

/// The only mark kind that participates in word timing. Backends also emit
/// sentence, viseme, and ssml marks; those are ignored here.
const WORD_KIND: &str = "word";

/// A raw timing event emitted by a synthesis backend.
///
/// This is the one interchange shape the engine owns. Offsets are byte
/// offsets into the UTF-8 text that was synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechMark {
    pub time_ms: f64,
    pub kind: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// When a word in the spoken text begins, in playback time.
///
/// Sequences produced by this module hold `time_ms` non-decreasing and
/// `word_index` strictly increasing from zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordTiming {
    /// Playback time at which the word starts, in milliseconds.
    pub time_ms: f64,
    /// Position of the word in emission order, starting at zero.
    pub word_index: usize,
    /// Byte offset of the word in the spoken text.
    pub char_offset: usize,
    /// Byte length of the word.
    pub length: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum MarkParseError {
    #[error("invalid speech mark JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Normalize backend speech marks into word timings.
///
/// Filters to word-kind marks, preserves arrival order, and assigns
/// sequential indices. Empty input yields an empty result, never an error.
pub fn parse_marks(marks: &[SpeechMark]) -> Vec<WordTiming> {
    let timings: Vec<WordTiming> = marks
        .iter()
        .filter(|mark| mark.kind == WORD_KIND)
        .enumerate()
        .map(|(word_index, mark)| WordTiming {
            time_ms: mark.time_ms,
            word_index,
            char_offset: mark.start_offset,
            length: mark.end_offset.saturating_sub(mark.start_offset),
        })
        .collect();

    log::debug!(
        "Parsed {} word timings from {} speech marks",
        timings.len(),
        marks.len()
    );
    timings
}

/// Fabricate approximate word timings from text alone.
///
/// Tokenizes on whitespace and spaces words evenly at `wpm` words per
/// minute. Each token's offset is located by scanning forward from the end
/// of the previous token, so repeated words resolve to their own
/// occurrence. Never fails: a token that cannot be located is skipped and
/// indices stay gap-free across the emitted entries.
pub fn estimate(text: &str, wpm: u32) -> Vec<WordTiming> {
    let ms_per_word = 60_000.0 / wpm.max(1) as f64;
    let mut timings = Vec::new();
    let mut search_from = 0usize;

    for token in text.split_whitespace() {
        let Some(found) = text[search_from..].find(token) else {
            continue;
        };
        let char_offset = search_from + found;
        timings.push(WordTiming {
            time_ms: timings.len() as f64 * ms_per_word,
            word_index: timings.len(),
            char_offset,
            length: token.len(),
        });
        search_from = char_offset + token.len();
    }

    timings
}

/// Parse speech marks from JSON.
///
/// Accepts either a top-level array or newline-delimited objects, the two
/// shapes backends and sidecar files deliver marks in.
pub fn marks_from_json(payload: &str) -> Result<Vec<SpeechMark>, MarkParseError> {
    let trimmed = payload.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{estimate, marks_from_json, parse_marks, SpeechMark, WordTiming};

    fn word_mark(time_ms: f64, start: usize, end: usize, text: &str) -> SpeechMark {
        SpeechMark {
            time_ms,
            kind: "word".to_string(),
            start_offset: start,
            end_offset: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn parses_word_marks_in_arrival_order() {
        let marks = vec![
            word_mark(0.0, 0, 5, "Hello"),
            word_mark(340.0, 6, 11, "world"),
        ];

        let timings = parse_marks(&marks);
        assert_eq!(
            timings,
            vec![
                WordTiming {
                    time_ms: 0.0,
                    word_index: 0,
                    char_offset: 0,
                    length: 5
                },
                WordTiming {
                    time_ms: 340.0,
                    word_index: 1,
                    char_offset: 6,
                    length: 5
                },
            ]
        );
    }

    #[test]
    fn ignores_non_word_marks_without_index_gaps() {
        let mut sentence = word_mark(0.0, 0, 11, "Hello world");
        sentence.kind = "sentence".to_string();
        let marks = vec![
            sentence,
            word_mark(10.0, 0, 5, "Hello"),
            word_mark(340.0, 6, 11, "world"),
        ];

        let timings = parse_marks(&marks);
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].word_index, 0);
        assert_eq!(timings[1].word_index, 1);
    }

    #[test]
    fn empty_marks_yield_empty_timings() {
        assert!(parse_marks(&[]).is_empty());
    }

    #[test]
    fn estimate_spaces_words_at_requested_rate() {
        let timings = estimate("one two three", 150);
        assert_eq!(timings.len(), 3);
        assert_eq!(timings[0].time_ms, 0.0);
        assert_eq!(timings[1].time_ms, 400.0);
        assert_eq!(timings[2].time_ms, 800.0);
    }

    #[test]
    fn estimate_locates_repeated_words_by_occurrence() {
        let text = "the cat saw the dog";
        let timings = estimate(text, 150);

        let offsets: Vec<usize> = timings.iter().map(|t| t.char_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12, 16]);
        assert_eq!(&text[timings[3].char_offset..][..timings[3].length], "the");
    }

    #[test]
    fn estimate_is_monotonic_and_deterministic() {
        let text = "Some   text\nwith  irregular\twhitespace runs";
        let first = estimate(text, 120);
        let second = estimate(text, 120);
        assert_eq!(first, second);

        for pair in first.windows(2) {
            assert!(pair[0].time_ms <= pair[1].time_ms);
            assert!(pair[0].word_index < pair[1].word_index);
        }
    }

    #[test]
    fn estimate_of_empty_text_is_empty() {
        assert!(estimate("", 150).is_empty());
        assert!(estimate("   \n\t ", 150).is_empty());
    }

    #[test]
    fn marks_parse_from_json_array() {
        let payload = r#"[
            {"timeMs": 0, "kind": "word", "startOffset": 0, "endOffset": 5, "text": "Hello"},
            {"timeMs": 340, "kind": "word", "startOffset": 6, "endOffset": 11, "text": "world"}
        ]"#;

        let marks = marks_from_json(payload).expect("array payload should parse");
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[1].time_ms, 340.0);
        assert_eq!(marks[1].start_offset, 6);
    }

    #[test]
    fn marks_parse_from_newline_delimited_json() {
        let payload = concat!(
            r#"{"timeMs": 0, "kind": "word", "startOffset": 0, "endOffset": 5, "text": "Hello"}"#,
            "\n",
            r#"{"timeMs": 120, "kind": "sentence", "startOffset": 0, "endOffset": 11, "text": "Hello world"}"#,
            "\n\n",
        );

        let marks = marks_from_json(payload).expect("ndjson payload should parse");
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[1].kind, "sentence");
    }

    #[test]
    fn malformed_mark_json_is_an_error() {
        assert!(marks_from_json("{not json").is_err());
    }
}
