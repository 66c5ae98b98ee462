use std::path::PathBuf;
use std::time::Instant;

use readaloud_rs::content::{ContentMap, ContentSurface, FragmentSpan};
use readaloud_rs::providers::prerendered::PrerenderedProvider;
use readaloud_rs::session::{HighlightSink, Narrator, SessionEvent};
use readaloud_rs::timing::{estimate, SpeechMark};

/// A small in-memory rendering surface: labeled fragments, one of which is
/// an inline run the way emphasis splits rendered text.
struct DemoSurface {
    fragments: Vec<(String, String)>,
}

impl ContentSurface for DemoSurface {
    type Fragment = String;

    fn for_each_fragment(&self, visit: &mut dyn FnMut(String, &str)) {
        for (label, text) in &self.fragments {
            visit(label.clone(), text);
        }
    }
}

struct PrintSink;

impl HighlightSink<String> for PrintSink {
    fn highlight(&mut self, spans: &[FragmentSpan<String>]) {
        let rendered: Vec<String> = spans
            .iter()
            .map(|span| format!("{}[{}..{}]", span.fragment, span.start, span.end))
            .collect();
        println!("  highlight {}", rendered.join(" + "));
    }

    fn clear(&mut self) {
        println!("  highlight cleared");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let surface = DemoSurface {
        fragments: vec![
            ("intro".to_string(), "The quick brown ".to_string()),
            ("intro-em".to_string(), "fox".to_string()),
            (
                "body".to_string(),
                " jumps over the lazy dog.".to_string(),
            ),
        ],
    };

    // Pre-render the fixture this demo narrates: one second of silent audio
    // plus a speech-mark sidecar paced to fit it.
    let spoken = ContentMap::index(&surface).spoken_text().to_string();
    let marks: Vec<SpeechMark> = estimate(&spoken, 540)
        .into_iter()
        .map(|timing| SpeechMark {
            time_ms: timing.time_ms,
            kind: "word".to_string(),
            start_offset: timing.char_offset,
            end_offset: timing.char_offset + timing.length,
            text: spoken[timing.char_offset..timing.char_offset + timing.length].to_string(),
        })
        .collect();

    let dir = std::env::temp_dir();
    let wav_path: PathBuf = dir.join("readaloud-demo.wav");
    let marks_path: PathBuf = dir.join("readaloud-demo.marks.json");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&wav_path, spec)?;
    for _ in 0..8000 {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    std::fs::write(&marks_path, serde_json::to_string_pretty(&marks)?)?;

    let provider = PrerenderedProvider::from_files(&wav_path, Some(&marks_path))?;
    let mut narrator = Narrator::new(provider);
    narrator.set_highlight_sink(Box::new(PrintSink));
    narrator.on_event(|event| {
        if let SessionEvent::StateChanged(state) = event {
            println!("state: {state:?}");
        }
    });

    println!("Narrating: {spoken:?}");
    let start = Instant::now();
    narrator.speak_to_end(&surface, None)?;
    println!("Finished in {:.2?}", start.elapsed());

    std::fs::remove_file(&wav_path).ok();
    std::fs::remove_file(&marks_path).ok();
    Ok(())
}
