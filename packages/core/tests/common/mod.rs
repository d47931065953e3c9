//! In-memory collaborators for export tests

#![allow(dead_code)]

use async_trait::async_trait;
use reframe_core::encoder::{EncodedChunk, EncoderBackend, EncoderConfig, OutputFormat, StreamEncoder};
use reframe_core::playback::AudioTrack;
use reframe_core::{BackgroundGenerator, BackgroundImage, Canvas, ReframeError, ReframeResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the fake encoder saw
#[derive(Debug, Default, Clone)]
pub struct EncoderLog {
    /// Every open attempt: format and whether audio was attached
    pub opens: Vec<(OutputFormat, bool)>,
    /// Source timestamps of pushed frames
    pub frames: Vec<Duration>,
    /// Canvas sizes of pushed frames
    pub sizes: Vec<(u32, u32)>,
    pub finished: bool,
}

pub struct FakeBackend {
    supported: Option<HashSet<OutputFormat>>,
    log: Arc<Mutex<EncoderLog>>,
    fail_open: bool,
    reject_audio: bool,
    emit_bytes: bool,
    frame_cost: Duration,
}

impl FakeBackend {
    /// Supports everything and produces output
    pub fn new() -> Self {
        Self {
            supported: None,
            log: Arc::new(Mutex::new(EncoderLog::default())),
            fail_open: false,
            reject_audio: false,
            emit_bytes: true,
            frame_cost: Duration::ZERO,
        }
    }

    pub fn supporting(formats: &[OutputFormat]) -> Self {
        Self {
            supported: Some(formats.iter().copied().collect()),
            ..Self::new()
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn rejecting_audio(mut self) -> Self {
        self.reject_audio = true;
        self
    }

    /// Encoder that never produces a byte
    pub fn silent(mut self) -> Self {
        self.emit_bytes = false;
        self
    }

    /// Encoder that blocks for `cost` on every frame, slower than real time
    pub fn with_frame_cost(mut self, cost: Duration) -> Self {
        self.frame_cost = cost;
        self
    }

    pub fn log(&self) -> Arc<Mutex<EncoderLog>> {
        Arc::clone(&self.log)
    }
}

impl EncoderBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports(&self, format: &OutputFormat) -> bool {
        self.supported
            .as_ref()
            .map_or(true, |supported| supported.contains(format))
    }

    fn open(
        &self,
        config: &EncoderConfig,
        audio: Option<&AudioTrack>,
    ) -> ReframeResult<Box<dyn StreamEncoder>> {
        self.log
            .lock()
            .unwrap()
            .opens
            .push((config.format, audio.is_some()));

        if self.fail_open {
            return Err(ReframeError::EncodingError("encoder unavailable".to_string()));
        }
        if audio.is_some() && self.reject_audio {
            return Err(ReframeError::EncodingError("cannot merge audio".to_string()));
        }
        Ok(Box::new(FakeEncoder {
            log: Arc::clone(&self.log),
            emit_bytes: self.emit_bytes,
            frame_cost: self.frame_cost,
            pending: Vec::new(),
        }))
    }
}

struct FakeEncoder {
    log: Arc<Mutex<EncoderLog>>,
    emit_bytes: bool,
    frame_cost: Duration,
    pending: Vec<EncodedChunk>,
}

#[async_trait]
impl StreamEncoder for FakeEncoder {
    fn push_frame(&mut self, canvas: &Canvas, timestamp: Duration) -> ReframeResult<()> {
        if !self.frame_cost.is_zero() {
            std::thread::sleep(self.frame_cost);
        }
        let mut log = self.log.lock().unwrap();
        log.frames.push(timestamp);
        log.sizes.push((canvas.width(), canvas.height()));
        if self.emit_bytes {
            self.pending
                .push(EncodedChunk::new(canvas.data()[..4].to_vec()));
        }
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<EncodedChunk> {
        std::mem::take(&mut self.pending)
    }

    async fn finish(mut self: Box<Self>) -> ReframeResult<Vec<EncodedChunk>> {
        self.log.lock().unwrap().finished = true;
        let mut tail = self.take_chunks();
        if self.emit_bytes {
            tail.push(EncodedChunk::new(b"trailer".to_vec()));
        }
        Ok(tail)
    }
}

/// Generator returning a fixed image, counting calls
#[derive(Default)]
pub struct FixedGenerator {
    pub calls: AtomicUsize,
}

impl FixedGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> ReframeResult<BackgroundImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BackgroundImage::from_rgba(2, 2, vec![40; 16])
    }
}

/// Generator that takes `delay` before answering
pub struct SlowGenerator {
    pub delay: Duration,
}

#[async_trait]
impl BackgroundGenerator for SlowGenerator {
    async fn generate(&self, _prompt: &str) -> ReframeResult<BackgroundImage> {
        tokio::time::sleep(self.delay).await;
        BackgroundImage::from_rgba(2, 2, vec![90; 16])
    }
}

/// Generator that always fails
pub struct FailingGenerator;

#[async_trait]
impl BackgroundGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> ReframeResult<BackgroundImage> {
        Err(ReframeError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "image service timed out",
        )))
    }
}
