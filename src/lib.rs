//! # readaloud-rs
//!
//! A Rust library for speech-synchronized read-aloud highlighting.
//!
//! The engine synthesizes speech for rendered text content and keeps a
//! "currently spoken" highlight in step with audio playback: word-level
//! timings are parsed from backend speech marks (or estimated from the text
//! when the backend reports none), a polling synchronizer turns the live
//! playback position into ordered word events, and a content map resolves
//! each word back to addressable fragments of the rendering surface.
//!
//! ## Features
//!
//! - **Word timing**: normalize backend speech marks, or estimate timings
//!   from text at a configurable words-per-minute rate
//! - **Content mapping**: resolve spoken-text offsets to live surface
//!   fragments, with staleness detection when the surface restructures
//! - **Playback sync**: ordered "word reached" events from a polled audio
//!   position, tolerant of transient position dropouts and seeks
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! readaloud-rs = "2026.8"
//! ```
//!
//! ```ignore
//! use readaloud_rs::providers::prerendered::PrerenderedProvider;
//! use readaloud_rs::session::Narrator;
//! use std::path::Path;
//!
//! let provider = PrerenderedProvider::from_files(
//!     Path::new("fixtures/passage.wav"),
//!     Some(Path::new("fixtures/passage.marks.json")),
//! )?;
//!
//! let mut narrator = Narrator::new(provider);
//! narrator.set_highlight_sink(Box::new(my_sink));
//! narrator.speak_to_end(&my_surface, None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod content;
pub mod providers;
pub mod session;
pub mod sync;
pub mod timing;

use std::time::Duration;

use timing::SpeechMark;

/// What a speech provider can do, one independent flag per capability.
///
/// Consumers branch on these flags, never on provider identity. In
/// particular, a provider that does not report playback position cannot
/// drive synchronized highlighting at all; the session then speaks without
/// highlights rather than guessing a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Playback can be paused mid-utterance.
    pub can_pause: bool,
    /// Playback can be resumed after a pause, reporting the actual offset
    /// it resumed from.
    pub can_resume: bool,
    /// Synthesis returns word-level speech marks.
    pub provides_word_timing: bool,
    /// The audio handle reports a live playback position.
    pub provides_position: bool,
    /// The audio handle reports total duration.
    pub provides_duration: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("synthesis request failed: {0}")]
    SynthesisFailed(String),
    #[error("synthesis request timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation not supported by this provider: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live audio transport for one synthesized utterance.
///
/// Owned by the synthesis backend; the engine only reads position and
/// drives play/pause/resume/stop through it.
pub trait AudioHandle {
    fn play(&mut self) -> Result<(), ProviderError>;

    fn pause(&mut self) -> Result<(), ProviderError>;

    /// Resume after a pause, returning the offset in milliseconds playback
    /// actually resumed from.
    ///
    /// A transport that restarts from anywhere other than the pause point
    /// must report the real offset here so highlight progress can be
    /// rewound; one that cannot report it at all should be exposed through
    /// a provider declaring [`ProviderCapabilities::can_resume`] false.
    fn resume(&mut self) -> Result<f64, ProviderError>;

    fn stop(&mut self);

    /// Current playback position in milliseconds, or `None` when the
    /// transport cannot say right now.
    fn position_ms(&self) -> Option<f64>;

    /// Total duration in milliseconds, if known.
    fn duration_ms(&self) -> Option<f64>;

    /// Whether playback has run to completion.
    fn ended(&self) -> bool;
}

/// The result of a synthesis request: a playable audio transport plus any
/// timing marks the backend produced.
pub struct Synthesis {
    pub audio: Box<dyn AudioHandle>,
    /// Raw backend timing events; `None` when the backend has no timing
    /// metadata (callers fall back to estimation).
    pub marks: Option<Vec<SpeechMark>>,
}

/// Common interface for speech synthesis providers.
///
/// Each provider may have its own voice parameter type; everything else a
/// consumer needs to know is expressed through [`ProviderCapabilities`].
pub trait SpeechProvider {
    /// Parameters for configuring a synthesis request (voice, rate, etc.)
    type VoiceParams: Default;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Synthesize speech for the given text.
    ///
    /// `timeout` bounds how long the request may take; a provider that
    /// cannot answer in time returns [`ProviderError::Timeout`] and no
    /// playback is started.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::VoiceParams>,
        timeout: Duration,
    ) -> Result<Synthesis, ProviderError>;
}
