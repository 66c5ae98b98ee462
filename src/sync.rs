//! Real-time playback synchronization.
//!
//! [`PlaybackSynchronizer`] turns a polled playback position into ordered
//! "word reached" events against an immutable timing table. It is a pure
//! state machine: whoever drives playback calls [`tick`] at the configured
//! interval, and every tick runs to completion, so no event can race a
//! pause or a stop. One synchronizer serves exactly one utterance; sessions
//! create a fresh one per utterance and drop it with the session.
//!
//! [`tick`]: PlaybackSynchronizer::tick

use std::time::Duration;

use crate::timing::WordTiming;

/// Default polling interval.
///
/// 50 ms is fine enough to track speech cadence without measurable cost;
/// coarser than ~100 ms produces visibly laggy highlighting, finer than
/// ~30 ms yields no perceptible benefit.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Consecutive null position reads tolerated before escalating. A single
/// null read is a transient underrun and is skipped silently.
const NULL_READ_LIMIT: u32 = 3;

/// Anything that can report a current playback position.
pub trait PositionSource {
    /// Current playback position in milliseconds, or `None` when the
    /// source cannot say right now.
    fn position_ms(&self) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Paused,
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("playback position unavailable for {0} consecutive reads")]
    PositionUnavailable(u32),
    #[error("synchronizer was already started")]
    AlreadyStarted,
    #[error("synchronizer is not running")]
    NotRunning,
    #[error("synchronizer is not paused")]
    NotPaused,
}

/// Polling state machine mapping playback position to word events.
pub struct PlaybackSynchronizer {
    timings: Vec<WordTiming>,
    state: SyncState,
    /// Count of timings consumed so far, emitted or skipped over.
    next_index: usize,
    null_reads: u32,
    interval: Duration,
}

impl Default for PlaybackSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSynchronizer {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            timings: Vec::new(),
            state: SyncState::Idle,
            next_index: 0,
            null_reads: 0,
            interval,
        }
    }

    /// The interval ticks should be driven at.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Begin tracking an utterance against the given timing table.
    ///
    /// Only valid from idle; a synchronizer is never reused across two live
    /// utterances.
    pub fn start(&mut self, timings: Vec<WordTiming>) -> Result<(), SyncError> {
        if self.state != SyncState::Idle {
            return Err(SyncError::AlreadyStarted);
        }
        self.timings = timings;
        self.next_index = 0;
        self.null_reads = 0;
        self.state = SyncState::Running;
        Ok(())
    }

    /// Poll the source once.
    ///
    /// Scans forward through timings whose `time_ms` the position has
    /// passed and returns at most the single most recently eligible one:
    /// after a large forward jump (a seek) the highlight must land on the
    /// word currently being spoken, never replay the skipped ones.
    ///
    /// A null position read is skipped; after three in a row the
    /// synchronizer disarms itself and returns an error for the caller to
    /// surface. Ticks on a non-running synchronizer are no-ops.
    pub fn tick(&mut self, source: &dyn PositionSource) -> Result<Option<WordTiming>, SyncError> {
        if self.state != SyncState::Running {
            return Ok(None);
        }

        let Some(position) = source.position_ms() else {
            self.null_reads += 1;
            if self.null_reads >= NULL_READ_LIMIT {
                self.state = SyncState::Idle;
                return Err(SyncError::PositionUnavailable(self.null_reads));
            }
            return Ok(None);
        };
        self.null_reads = 0;

        let before = self.next_index;
        while self.next_index < self.timings.len()
            && self.timings[self.next_index].time_ms <= position
        {
            self.next_index += 1;
        }

        if self.next_index == before {
            return Ok(None);
        }
        let skipped = self.next_index - before - 1;
        if skipped > 0 {
            log::debug!("position jumped past {skipped} words, emitting only the latest");
        }
        Ok(Some(self.timings[self.next_index - 1]))
    }

    /// Halt polling, retaining progress.
    pub fn pause(&mut self) -> Result<(), SyncError> {
        if self.state != SyncState::Running {
            return Err(SyncError::NotRunning);
        }
        self.state = SyncState::Paused;
        Ok(())
    }

    /// Continue polling after a pause.
    ///
    /// `resumed_offset_ms` is the offset the source actually resumed from.
    /// When it lies before the pause point, progress rewinds to the count
    /// of timings already passed at that offset, so no word between the two
    /// positions is silently skipped.
    pub fn resume(&mut self, resumed_offset_ms: f64) -> Result<(), SyncError> {
        if self.state != SyncState::Paused {
            return Err(SyncError::NotPaused);
        }
        let reached = self
            .timings
            .partition_point(|timing| timing.time_ms <= resumed_offset_ms);
        self.next_index = self.next_index.min(reached);
        self.null_reads = 0;
        self.state = SyncState::Running;
        Ok(())
    }

    /// Return to idle. Idempotent; emits no terminal event (the source's
    /// own "ended" signal is the completion indicator).
    pub fn stop(&mut self) {
        self.state = SyncState::Idle;
        self.timings.clear();
        self.next_index = 0;
        self.null_reads = 0;
    }
}
