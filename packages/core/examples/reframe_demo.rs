//! Reframe a synthetic landscape clip into a vertical video
//!
//! Run with: cargo run --example reframe_demo -p reframe-core
//!
//! Set `RUST_LOG=reframe_core=debug` for per-frame logging.

use reframe_core::encoder::SidecarBackend;
use reframe_core::playback::{AudioSamples, AudioTrack};
use reframe_core::{
    AspectRatio, CaptureOrchestrator, Color, ExportOutcome, ExportSettings, FitMode, RenderConfig,
    SyntheticSource,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// A 440 Hz tone, stereo
fn tone(seconds: u32) -> AudioSamples {
    let sample_rate = 48_000;
    let samples = (0..sample_rate * seconds)
        .flat_map(|i| {
            let t = i as f32 / sample_rate as f32;
            let v = (t * 440.0 * std::f32::consts::TAU).sin() * 0.2;
            [v, v]
        })
        .collect();
    AudioSamples {
        samples,
        sample_rate,
        channels: 2,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("reframe_core=info".parse()?))
        .init();

    println!("Reframe Demo");
    println!("============\n");

    println!("Checking ffmpeg...");
    let backend = SidecarBackend::new()?;
    println!("FFmpeg is ready!\n");

    let seconds = 3;
    let source = SyntheticSource::new(1280, 720, Duration::from_secs(seconds as u64))
        .with_frame_rate(30)
        .with_name("demo.mp4")
        .with_audio(AudioTrack::Pcm(tone(seconds)));

    let target = AspectRatio::Vertical9x16
        .preset_dimensions()
        .ok_or_else(|| anyhow::anyhow!("preset has no fixed size"))?;
    let config = RenderConfig::new(target)
        .with_fit_mode(FitMode::Contain)
        .with_background_color(Color::from_hex("#1e1b4b")?);

    let settings = ExportSettings::default();
    let mut orchestrator =
        CaptureOrchestrator::new(Box::new(source), Arc::new(backend)).with_settings(settings);
    let last_decile = AtomicU32::new(u32::MAX);
    orchestrator.on_status(move |status| {
        let decile = status.progress as u32 / 10;
        if last_decile.swap(decile, Ordering::Relaxed) != decile {
            println!("  {} {:>5.1}%", status.state, status.progress);
        }
    });

    println!("Exporting {}s clip as {} ({})...", seconds, target, config.fit_mode);
    let start = Instant::now();
    let outcome = orchestrator.start_export(&config).await?;
    let elapsed = start.elapsed();

    match outcome {
        ExportOutcome::Completed { filename, bytes } => {
            let artifact = orchestrator
                .take_artifact()
                .ok_or_else(|| anyhow::anyhow!("artifact missing"))?;
            let path = artifact.save_to(std::path::Path::new("."))?;
            println!("\nExport complete!");
            println!("  File: {} ({})", filename, path.display());
            println!("  Size: {:.2} MB", bytes as f64 / 1_048_576.0);
            println!("  Frames: {}", artifact.frame_count);
            println!("  Time: {:.2}s", elapsed.as_secs_f64());
        }
        ExportOutcome::Cancelled => println!("\nExport cancelled"),
    }

    Ok(())
}
