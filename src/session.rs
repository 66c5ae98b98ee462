//! Speech session orchestration.
//!
//! [`Narrator`] composes the engine per utterance: it linearizes the
//! surface, requests synthesis, acquires word timings (parsed from marks or
//! estimated), and drives a [`PlaybackSynchronizer`] against the provider's
//! audio handle. Each word event is resolved through the content map and
//! handed to the host's [`HighlightSink`]; everything else the host needs
//! arrives on a single subscribable event stream.
//!
//! The model is single-threaded and cooperative: the host calls
//! [`Narrator::tick`] at the configured poll interval (or lets
//! [`Narrator::speak_to_end`] drive), and every tick runs to completion
//! before control returns. At most one utterance is live at a time;
//! starting a new one stops the previous.

use std::time::Duration;

use derive_builder::Builder;

use crate::content::{ContentMap, ContentSurface, FragmentSpan};
use crate::sync::{PlaybackSynchronizer, PositionSource, SyncError, SyncState, DEFAULT_POLL_INTERVAL};
use crate::timing::{self, WordTiming, DEFAULT_WPM};
use crate::{AudioHandle, ProviderError, SpeechProvider, Synthesis};

/// Lifecycle of the current utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Ended,
    Error,
}

/// Receives highlight coordinates computed by the engine.
///
/// The surface (or an adapter over it) renders them; the engine only
/// computes. `clear` removes any visible highlight and is also the signal
/// that coordinates can no longer be trusted for the current utterance.
pub trait HighlightSink<F> {
    fn highlight(&mut self, spans: &[FragmentSpan<F>]);
    fn clear(&mut self);
}

/// Why highlighting was shut off mid-utterance while audio kept playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// The surface restructured since indexing.
    SurfaceChanged,
    /// A word's range no longer resolves to any fragment.
    Unresolvable,
}

/// Events emitted by a [`Narrator`], in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(PlaybackState),
    WordReached {
        word_index: usize,
        char_offset: usize,
        length: usize,
    },
    /// Estimated timings are in use for this utterance. Informational, not
    /// an error.
    TimingsEstimated,
    /// Highlighting was disabled for the rest of the utterance.
    HighlightingSuspended(SuspendReason),
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("speech provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("playback degraded: {0}")]
    Degraded(#[from] SyncError),
    #[error("surface has no spoken text")]
    EmptyUtterance,
    #[error("no active utterance")]
    NoUtterance,
    #[error("utterance is not playing")]
    NotPlaying,
    #[error("utterance is not paused")]
    NotPaused,
}

/// Options governing a narrator's sessions.
#[derive(Debug, Clone, Builder)]
pub struct NarrationOptions {
    /// Speaking rate assumed when timings must be estimated.
    #[builder(default = "DEFAULT_WPM")]
    pub estimate_wpm: u32,
    /// Cadence ticks should be driven at.
    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub poll_interval: Duration,
    /// Time allowed for one synthesis request.
    #[builder(default = "Duration::from_secs(10)")]
    pub synthesis_timeout: Duration,
}

impl Default for NarrationOptions {
    fn default() -> Self {
        Self {
            estimate_wpm: DEFAULT_WPM,
            poll_interval: DEFAULT_POLL_INTERVAL,
            synthesis_timeout: Duration::from_secs(10),
        }
    }
}

/// One live utterance: the indexed content, the provider's audio transport,
/// and the synchronizer bound to it. Discarded on completion, stop, or
/// fatal error.
struct Utterance<F> {
    map: ContentMap<F>,
    audio: Box<dyn AudioHandle>,
    /// `None` when the provider reports no playback position; audio then
    /// plays without synchronized highlighting.
    sync: Option<PlaybackSynchronizer>,
    state: PlaybackState,
    highlight_suspended: bool,
}

struct AudioPosition<'a>(&'a dyn AudioHandle);

impl PositionSource for AudioPosition<'_> {
    fn position_ms(&self) -> Option<f64> {
        self.0.position_ms()
    }
}

/// Orchestrates read-aloud sessions over a speech provider.
pub struct Narrator<P: SpeechProvider, F: Clone + PartialEq> {
    provider: P,
    options: NarrationOptions,
    utterance: Option<Utterance<F>>,
    event_sink: Option<Box<dyn FnMut(&SessionEvent)>>,
    error_sink: Option<Box<dyn FnMut(&SessionError)>>,
    highlight_sink: Option<Box<dyn HighlightSink<F>>>,
}

impl<P: SpeechProvider, F: Clone + PartialEq> Narrator<P, F> {
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, NarrationOptions::default())
    }

    pub fn with_options(provider: P, options: NarrationOptions) -> Self {
        Self {
            provider,
            options,
            utterance: None,
            event_sink: None,
            error_sink: None,
            highlight_sink: None,
        }
    }

    /// Subscribe to the session event stream. One subscriber at a time;
    /// setting a new one replaces the old.
    pub fn on_event(&mut self, sink: impl FnMut(&SessionEvent) + 'static) {
        self.event_sink = Some(Box::new(sink));
    }

    /// Subscribe to utterance-fatal errors.
    pub fn on_error(&mut self, sink: impl FnMut(&SessionError) + 'static) {
        self.error_sink = Some(Box::new(sink));
    }

    /// Install the consumer that renders highlight coordinates.
    pub fn set_highlight_sink(&mut self, sink: Box<dyn HighlightSink<F>>) {
        self.highlight_sink = Some(sink);
    }

    pub fn options(&self) -> &NarrationOptions {
        &self.options
    }

    /// Cadence [`tick`](Self::tick) should be driven at.
    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn state(&self) -> PlaybackState {
        self.utterance
            .as_ref()
            .map(|utterance| utterance.state)
            .unwrap_or(PlaybackState::Idle)
    }

    /// Begin narrating the surface's current content.
    ///
    /// Any prior utterance is stopped first. The surface is linearized and
    /// indexed, the provider synthesizes the linearized text, and timing
    /// comes from the provider's marks when it has them, or from estimation
    /// otherwise (announced via [`SessionEvent::TimingsEstimated`]). A
    /// provider that reports no playback position plays without
    /// synchronized highlighting rather than guessing.
    pub fn speak(
        &mut self,
        surface: &dyn ContentSurface<Fragment = F>,
        params: Option<P::VoiceParams>,
    ) -> Result<(), SessionError> {
        self.stop();

        let map = ContentMap::index(surface);
        if map.is_empty() {
            return Err(SessionError::EmptyUtterance);
        }

        let capabilities = self.provider.capabilities();
        let synthesis =
            match self
                .provider
                .synthesize(map.spoken_text(), params, self.options.synthesis_timeout)
            {
                Ok(synthesis) => synthesis,
                Err(error) => {
                    let error = SessionError::Provider(error);
                    self.emit_error(&error);
                    return Err(error);
                }
            };
        let Synthesis { mut audio, marks } = synthesis;

        let timings = match marks {
            Some(marks) if capabilities.provides_word_timing => timing::parse_marks(&marks),
            _ => {
                log::info!(
                    "no word timing from provider, estimating at {} wpm",
                    self.options.estimate_wpm
                );
                self.emit(SessionEvent::TimingsEstimated);
                timing::estimate(map.spoken_text(), self.options.estimate_wpm)
            }
        };

        let sync = if capabilities.provides_position {
            let mut sync = PlaybackSynchronizer::with_interval(self.options.poll_interval);
            sync.start(timings)?;
            Some(sync)
        } else {
            log::warn!("provider reports no playback position; speaking without highlights");
            None
        };

        if let Err(error) = audio.play() {
            let error = SessionError::Provider(error);
            self.emit_error(&error);
            return Err(error);
        }

        self.utterance = Some(Utterance {
            map,
            audio,
            sync,
            state: PlaybackState::Playing,
            highlight_suspended: false,
        });
        self.emit(SessionEvent::StateChanged(PlaybackState::Playing));
        Ok(())
    }

    /// Drive one synchronizer poll against the live surface.
    ///
    /// Hosts call this at [`poll_interval`](Self::poll_interval) while an
    /// utterance is playing; every call runs to completion. Ticks outside
    /// the playing state are no-ops.
    pub fn tick(&mut self, surface: &dyn ContentSurface<Fragment = F>) {
        let Some(mut utterance) = self.utterance.take() else {
            return;
        };
        if utterance.state != PlaybackState::Playing {
            self.utterance = Some(utterance);
            return;
        }

        if utterance.audio.ended() {
            if let Some(sync) = utterance.sync.as_mut() {
                sync.stop();
            }
            log::debug!("utterance ended");
            // The session is discarded on completion.
            self.emit(SessionEvent::StateChanged(PlaybackState::Ended));
            return;
        }

        let polled = match utterance.sync.as_mut() {
            Some(sync) => sync.tick(&AudioPosition(&*utterance.audio)),
            None => Ok(None),
        };

        match polled {
            Ok(None) => {}
            Ok(Some(word)) => {
                self.emit(SessionEvent::WordReached {
                    word_index: word.word_index,
                    char_offset: word.char_offset,
                    length: word.length,
                });
                self.apply_highlight(&mut utterance, surface, &word);
            }
            Err(error) => {
                utterance.state = PlaybackState::Error;
                utterance.highlight_suspended = true;
                if let Some(sink) = self.highlight_sink.as_mut() {
                    sink.clear();
                }
                log::warn!("playback degraded: {error}");
                let error = SessionError::Degraded(error);
                self.emit_error(&error);
                self.emit(SessionEvent::StateChanged(PlaybackState::Error));
                // Audio is deliberately left playing; stop() is the host's
                // call.
            }
        }
        self.utterance = Some(utterance);
    }

    fn apply_highlight(
        &mut self,
        utterance: &mut Utterance<F>,
        surface: &dyn ContentSurface<Fragment = F>,
        word: &WordTiming,
    ) {
        if self.highlight_sink.is_none() {
            return;
        }

        if !utterance.highlight_suspended && !utterance.map.revalidate(surface) {
            utterance.highlight_suspended = true;
            self.emit(SessionEvent::HighlightingSuspended(
                SuspendReason::SurfaceChanged,
            ));
        }

        let spans = utterance.map.resolve(word.char_offset, word.length);

        if utterance.highlight_suspended {
            if let Some(sink) = self.highlight_sink.as_mut() {
                sink.clear();
            }
            return;
        }

        if spans.is_empty() {
            utterance.highlight_suspended = true;
            log::warn!(
                "word at {}..{} resolves to no fragment; highlighting disabled",
                word.char_offset,
                word.char_offset + word.length
            );
            self.emit(SessionEvent::HighlightingSuspended(
                SuspendReason::Unresolvable,
            ));
            if let Some(sink) = self.highlight_sink.as_mut() {
                sink.clear();
            }
            return;
        }

        if let Some(sink) = self.highlight_sink.as_mut() {
            sink.highlight(&spans);
        }
    }

    /// Pause the current utterance: the provider's audio first, then the
    /// synchronizer, so no tick can observe a paused source as running.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        let capabilities = self.provider.capabilities();
        let Some(utterance) = self.utterance.as_mut() else {
            return Err(SessionError::NoUtterance);
        };
        if utterance.state != PlaybackState::Playing {
            return Err(SessionError::NotPlaying);
        }
        if !capabilities.can_pause {
            return Err(ProviderError::Unsupported("pause").into());
        }

        utterance.audio.pause()?;
        if let Some(sync) = utterance.sync.as_mut() {
            if sync.state() == SyncState::Running {
                sync.pause()?;
            }
        }
        utterance.state = PlaybackState::Paused;
        self.emit(SessionEvent::StateChanged(PlaybackState::Paused));
        Ok(())
    }

    /// Resume a paused utterance.
    ///
    /// The transport reports the offset it actually resumed from; the
    /// synchronizer rewinds when that lies before the pause point, so no
    /// word between the two positions loses its highlight.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        let capabilities = self.provider.capabilities();
        let Some(utterance) = self.utterance.as_mut() else {
            return Err(SessionError::NoUtterance);
        };
        if utterance.state != PlaybackState::Paused {
            return Err(SessionError::NotPaused);
        }
        if !capabilities.can_resume {
            return Err(ProviderError::Unsupported("resume").into());
        }

        let resumed_offset = utterance.audio.resume()?;
        if let Some(sync) = utterance.sync.as_mut() {
            if sync.state() == SyncState::Paused {
                sync.resume(resumed_offset)?;
            }
        }
        utterance.state = PlaybackState::Playing;
        self.emit(SessionEvent::StateChanged(PlaybackState::Playing));
        Ok(())
    }

    /// Stop and discard the current utterance. Idempotent: a second call
    /// returns silently and emits nothing.
    pub fn stop(&mut self) {
        let Some(mut utterance) = self.utterance.take() else {
            return;
        };
        if let Some(sync) = utterance.sync.as_mut() {
            sync.stop();
        }
        utterance.audio.stop();
        self.emit(SessionEvent::StateChanged(PlaybackState::Idle));
    }

    /// Playback progress in `[0, 1]`, or `None` when the transport cannot
    /// report position and duration.
    pub fn progress(&self) -> Option<f64> {
        let utterance = self.utterance.as_ref()?;
        let position = utterance.audio.position_ms()?;
        let duration = utterance.audio.duration_ms()?;
        if duration <= 0.0 {
            return None;
        }
        Some((position / duration).clamp(0.0, 1.0))
    }

    /// Narrate the surface and block until playback leaves the playing
    /// state, driving ticks at the configured interval.
    pub fn speak_to_end(
        &mut self,
        surface: &dyn ContentSurface<Fragment = F>,
        params: Option<P::VoiceParams>,
    ) -> Result<(), SessionError> {
        self.speak(surface, params)?;
        while self.state() == PlaybackState::Playing {
            std::thread::sleep(self.options.poll_interval);
            self.tick(surface);
        }
        Ok(())
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some(sink) = self.event_sink.as_mut() {
            sink(&event);
        }
    }

    fn emit_error(&mut self, error: &SessionError) {
        if let Some(sink) = self.error_sink.as_mut() {
            sink(error);
        }
    }
}
