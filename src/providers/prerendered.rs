//! Pre-rendered utterance provider.
//!
//! Assessment content is often synthesized ahead of time and shipped as an
//! audio file plus a speech-mark sidecar. This provider serves one such
//! utterance: duration comes from the WAV header, timing from the sidecar,
//! and playback position from a monotonic clock, so the rest of the engine
//! behaves exactly as it would against a live backend. Hosts that play the
//! actual audio out of band keep their player and this clock in step by
//! starting both together.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::timing::{self, SpeechMark};
use crate::{AudioHandle, ProviderCapabilities, ProviderError, SpeechProvider, Synthesis};

/// Parameters for a pre-rendered synthesis request.
#[derive(Debug, Clone)]
pub struct PrerenderedParams {
    /// Playback rate multiplier. Range: 0.5–2.0, default 1.0. Mark times
    /// and duration are scaled accordingly.
    pub rate: f32,
}

impl Default for PrerenderedParams {
    fn default() -> Self {
        Self { rate: 1.0 }
    }
}

/// Serves a single pre-rendered utterance regardless of the requested text.
///
/// # Quick Start
///
/// ```rust,no_run
/// use readaloud_rs::providers::prerendered::PrerenderedProvider;
/// use std::path::Path;
///
/// let provider = PrerenderedProvider::from_files(
///     Path::new("fixtures/passage.wav"),
///     Some(Path::new("fixtures/passage.marks.json")),
/// )?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PrerenderedProvider {
    duration_ms: f64,
    marks: Option<Vec<SpeechMark>>,
}

impl PrerenderedProvider {
    /// Load from a WAV file and an optional speech-mark JSON sidecar
    /// (array or newline-delimited).
    pub fn from_files(wav_path: &Path, marks_path: Option<&Path>) -> Result<Self, ProviderError> {
        let reader = hound::WavReader::open(wav_path).map_err(|e| {
            ProviderError::SynthesisFailed(format!("failed to open {}: {e}", wav_path.display()))
        })?;
        let spec = reader.spec();
        let duration_ms = reader.duration() as f64 * 1000.0 / spec.sample_rate as f64;

        let marks = match marks_path {
            Some(path) => {
                let payload = std::fs::read_to_string(path)?;
                let marks = timing::marks_from_json(&payload)
                    .map_err(|e| ProviderError::SynthesisFailed(e.to_string()))?;
                Some(marks)
            }
            None => None,
        };

        log::info!(
            "Loaded pre-rendered utterance: {:.2}s audio, {} marks",
            duration_ms / 1000.0,
            marks.as_ref().map(Vec::len).unwrap_or(0)
        );
        Ok(Self { duration_ms, marks })
    }

    /// Construct directly from a known duration and optional marks.
    pub fn from_parts(duration_ms: f64, marks: Option<Vec<SpeechMark>>) -> Self {
        Self { duration_ms, marks }
    }
}

impl SpeechProvider for PrerenderedProvider {
    type VoiceParams = PrerenderedParams;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            can_pause: true,
            can_resume: true,
            provides_word_timing: self.marks.is_some(),
            provides_position: true,
            provides_duration: true,
        }
    }

    /// The requested text is not re-synthesized; the provider serves its
    /// pre-rendered utterance, with mark times rescaled to the requested
    /// rate.
    fn synthesize(
        &mut self,
        _text: &str,
        params: Option<Self::VoiceParams>,
        _timeout: Duration,
    ) -> Result<Synthesis, ProviderError> {
        let params = params.unwrap_or_default();
        let rate = f64::from(params.rate.clamp(0.5, 2.0));

        let marks = self.marks.as_ref().map(|marks| {
            marks
                .iter()
                .map(|mark| SpeechMark {
                    time_ms: mark.time_ms / rate,
                    ..mark.clone()
                })
                .collect()
        });

        Ok(Synthesis {
            audio: Box::new(ClockAudioHandle::new(self.duration_ms / rate)),
            marks,
        })
    }
}

/// Audio transport backed by a monotonic clock rather than a device.
///
/// Position advances in real time from `play()`, freezes across
/// `pause()`/`resume()`, and clamps at the configured duration. Resume is
/// exact, so the reported resume offset always equals the pause position.
pub struct ClockAudioHandle {
    duration_ms: f64,
    /// Start of the current running stretch; `None` while paused, stopped,
    /// or not yet playing.
    started: Option<Instant>,
    /// Playback time accumulated before the current running stretch.
    elapsed_ms: f64,
    stopped: bool,
}

impl ClockAudioHandle {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            started: None,
            elapsed_ms: 0.0,
            stopped: false,
        }
    }

    fn offset_ms(&self) -> f64 {
        let running = self
            .started
            .map(|started| started.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        (self.elapsed_ms + running).min(self.duration_ms)
    }
}

impl AudioHandle for ClockAudioHandle {
    fn play(&mut self) -> Result<(), ProviderError> {
        if self.stopped {
            return Err(ProviderError::Unsupported("play after stop"));
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), ProviderError> {
        if let Some(started) = self.started.take() {
            self.elapsed_ms += started.elapsed().as_secs_f64() * 1000.0;
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<f64, ProviderError> {
        if self.stopped {
            return Err(ProviderError::Unsupported("resume after stop"));
        }
        let offset = self.elapsed_ms.min(self.duration_ms);
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        Ok(offset)
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.started = None;
    }

    fn position_ms(&self) -> Option<f64> {
        if self.stopped {
            return None;
        }
        Some(self.offset_ms())
    }

    fn duration_ms(&self) -> Option<f64> {
        Some(self.duration_ms)
    }

    fn ended(&self) -> bool {
        !self.stopped && self.offset_ms() >= self.duration_ms
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{ClockAudioHandle, PrerenderedParams, PrerenderedProvider};
    use crate::{AudioHandle, SpeechProvider};

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("readaloud-test-{}-{name}", std::process::id()));
        path
    }

    fn write_silent_wav(path: &PathBuf, sample_rate: u32, samples: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for _ in 0..samples {
            writer.write_sample(0i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn reads_duration_from_wav_header() {
        let path = temp_path("duration.wav");
        write_silent_wav(&path, 8000, 8000);

        let provider =
            PrerenderedProvider::from_files(&path, None).expect("wav fixture should load");
        let capabilities = provider.capabilities();
        assert!(!capabilities.provides_word_timing);

        let mut provider = provider;
        let synthesis = provider
            .synthesize("irrelevant", None, Duration::from_secs(1))
            .expect("synthesize should succeed");
        assert_eq!(synthesis.audio.duration_ms(), Some(1000.0));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn loads_marks_sidecar_and_rescales_for_rate() {
        let wav = temp_path("marks.wav");
        write_silent_wav(&wav, 8000, 8000);
        let sidecar = temp_path("marks.json");
        std::fs::write(
            &sidecar,
            r#"[{"timeMs": 0, "kind": "word", "startOffset": 0, "endOffset": 5, "text": "Hello"},
               {"timeMs": 400, "kind": "word", "startOffset": 6, "endOffset": 11, "text": "world"}]"#,
        )
        .expect("write sidecar");

        let mut provider = PrerenderedProvider::from_files(&wav, Some(&sidecar))
            .expect("fixture pair should load");
        assert!(provider.capabilities().provides_word_timing);

        let synthesis = provider
            .synthesize(
                "irrelevant",
                Some(PrerenderedParams { rate: 2.0 }),
                Duration::from_secs(1),
            )
            .expect("synthesize should succeed");

        let marks = synthesis.marks.expect("marks should be present");
        assert_eq!(marks[1].time_ms, 200.0);
        assert_eq!(synthesis.audio.duration_ms(), Some(500.0));

        std::fs::remove_file(&wav).ok();
        std::fs::remove_file(&sidecar).ok();
    }

    #[test]
    fn missing_wav_is_an_error() {
        let path = temp_path("does-not-exist.wav");
        assert!(PrerenderedProvider::from_files(&path, None).is_err());
    }

    #[test]
    fn clock_freezes_across_pause_and_resumes_exactly() {
        let mut clock = ClockAudioHandle::new(10_000.0);
        clock.play().expect("play should succeed");
        std::thread::sleep(Duration::from_millis(30));

        clock.pause().expect("pause should succeed");
        let frozen = clock.position_ms().expect("position while paused");
        assert!(frozen >= 25.0, "clock should have advanced, got {frozen}");

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.position_ms(), Some(frozen), "paused clock is frozen");

        let resumed_from = clock.resume().expect("resume should succeed");
        assert_eq!(resumed_from, frozen, "exact-offset resume");
        assert!(!clock.ended());
    }

    #[test]
    fn clock_runs_out_at_duration() {
        let mut clock = ClockAudioHandle::new(1.0);
        clock.play().expect("play should succeed");
        std::thread::sleep(Duration::from_millis(10));

        assert!(clock.ended());
        assert_eq!(clock.position_ms(), Some(1.0), "position clamps at duration");
    }

    #[test]
    fn stopped_clock_reports_nothing_and_rejects_play() {
        let mut clock = ClockAudioHandle::new(1000.0);
        clock.play().expect("play should succeed");
        clock.stop();

        assert_eq!(clock.position_ms(), None);
        assert!(!clock.ended());
        assert!(clock.play().is_err());
        assert!(clock.resume().is_err());
    }
}
