//! Speech providers.
//!
//! This module contains implementations of the
//! [`SpeechProvider`](crate::SpeechProvider) trait.
//!
//! # Available Providers
//!
//! - [`prerendered`]: serves a pre-rendered utterance from a WAV file and
//!   an optional speech-mark sidecar. Useful for offline fixtures, demos,
//!   and hosts that render audio out of band.

pub mod prerendered;
