//! Export orchestration
//!
//! [`CaptureOrchestrator`] owns the export state machine:
//!
//! ```text
//! Idle -> GeneratingBackground -> Idle      (optional, before recording)
//! Idle -> Recording -> Completed -> Idle    (reset)
//! any  -> Idle                              (failure or cancellation)
//! ```
//!
//! It drives the source's playback clock, composites every presented frame,
//! feeds the encoder, and publishes state and progress through a
//! `tokio::sync::watch` channel and registered callbacks.

use crate::compositor::{render, Canvas};
use crate::config::{BackgroundImage, ExportSettings, RenderConfig};
use crate::encoder::{select_output_format, EncoderBackend, EncoderConfig, OutputFormat, StreamEncoder};
use crate::generator::BackgroundGenerator;
use crate::playback::{select_notifier, AudioSettings, FrameTick, MediaSource, SourceMetadata};
use crate::session::{CaptureSession, ExportArtifact};
use crate::{ReframeError, ReframeResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Live progress stays below this until end-of-stream
const MAX_LIVE_PROGRESS: f64 = 0.99;

/// Lifecycle state of the export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExportState {
    #[default]
    Idle,
    GeneratingBackground,
    Recording,
    Completed,
}

impl ExportState {
    /// Whether an export attempt is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, ExportState::GeneratingBackground | ExportState::Recording)
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportState::Idle => write!(f, "idle"),
            ExportState::GeneratingBackground => write!(f, "generating background"),
            ExportState::Recording => write!(f, "recording"),
            ExportState::Completed => write!(f, "completed"),
        }
    }
}

/// Snapshot published to observers
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ExportStatus {
    pub state: ExportState,
    /// Percent, 0-100
    pub progress: f64,
    /// Most recent user-visible error
    pub error: Option<String>,
}

/// Status callback type
pub type StatusCallback = Box<dyn Fn(&ExportStatus) + Send + Sync + 'static>;

/// How a started export ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { filename: String, bytes: usize },
    /// Stopped through a [`CancelHandle`]
    Cancelled,
}

/// Cooperative cancellation of a running export
///
/// Cloneable and usable from any task or from a status callback. The frame
/// pump notices at the top of its next iteration.
#[derive(Clone)]
pub struct CancelHandle {
    status: Arc<watch::Sender<ExportStatus>>,
}

impl CancelHandle {
    /// Request cancellation; returns `false` when nothing was running
    pub fn cancel(&self) -> bool {
        self.status.send_if_modified(|status| {
            if status.state.is_active() {
                status.state = ExportState::Idle;
                status.progress = 0.0;
                true
            } else {
                false
            }
        })
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &self.status.borrow().state)
            .finish()
    }
}

/// Playback state to put back after an export
#[derive(Debug, Clone, Copy)]
struct PreviewState {
    position: Duration,
    audio: AudioSettings,
}

/// Drives one source through compositing and encoding, one export at a time
pub struct CaptureOrchestrator {
    source: Box<dyn MediaSource>,
    backend: Arc<dyn EncoderBackend>,
    generator: Option<Arc<dyn BackgroundGenerator>>,
    settings: ExportSettings,
    status: Arc<watch::Sender<ExportStatus>>,
    observers: Vec<StatusCallback>,
    artifact: Option<ExportArtifact>,
    /// Last generated background and the prompt it was made from
    generated_background: Option<(String, BackgroundImage)>,
}

impl CaptureOrchestrator {
    pub fn new(source: Box<dyn MediaSource>, backend: Arc<dyn EncoderBackend>) -> Self {
        let (status, _) = watch::channel(ExportStatus::default());
        Self {
            source,
            backend,
            generator: None,
            settings: ExportSettings::default(),
            status: Arc::new(status),
            observers: Vec::new(),
            artifact: None,
            generated_background: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn BackgroundGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_settings(mut self, settings: ExportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register a callback invoked after every status change made by the orchestrator
    pub fn on_status<F>(&mut self, callback: F)
    where
        F: Fn(&ExportStatus) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportStatus> {
        self.status.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            status: Arc::clone(&self.status),
        }
    }

    pub fn status(&self) -> ExportStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ExportState {
        self.status.borrow().state
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn source(&self) -> &dyn MediaSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn MediaSource {
        self.source.as_mut()
    }

    /// The finished export, while `Completed`
    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.artifact.as_ref()
    }

    /// Hand the finished export to the caller; the state stays `Completed`
    pub fn take_artifact(&mut self) -> Option<ExportArtifact> {
        self.artifact.take()
    }

    /// Most recently generated background, reusable for the next export
    pub fn background_image(&self) -> Option<&BackgroundImage> {
        self.generated_background.as_ref().map(|(_, image)| image)
    }

    /// Run one export from start to finish
    ///
    /// Rejected with [`ReframeError::ExportActive`] unless the state is
    /// `Idle`. Every other error ends the attempt: the state returns to
    /// `Idle`, the message is published, and the source is left intact.
    pub async fn start_export(&mut self, config: &RenderConfig) -> ReframeResult<ExportOutcome> {
        let state = self.state();
        if state != ExportState::Idle {
            warn!(%state, "Export request rejected");
            return Err(ReframeError::ExportActive(state));
        }

        let metadata = match self.source.metadata() {
            Some(metadata) if metadata.is_ready() => metadata,
            _ => return Err(self.fail(ReframeError::MetadataUnavailable, None).await),
        };
        if let Err(e) = self.settings.validate().and_then(|_| config.target.validate()) {
            return Err(self.fail(e, None).await);
        }

        let mut config = config.clone();
        if config.needs_generated_background() {
            match self.resolve_background(&config.ai_prompt).await {
                Ok(Some(image)) => config.background_image = Some(image),
                Ok(None) => {
                    info!("Export cancelled during background generation");
                    self.notify_observers();
                    return Ok(ExportOutcome::Cancelled);
                }
                Err(e) => return Err(self.fail(e, None).await),
            }
        }

        self.record(&config, &metadata).await
    }

    /// Discard the result and any error, return to `Idle`, and park the
    /// preview at the middle of the source
    pub async fn reset(&mut self) -> ReframeResult<()> {
        let state = self.state();
        if state.is_active() {
            return Err(ReframeError::ExportActive(state));
        }

        self.artifact = None;
        self.publish(|status| {
            status.state = ExportState::Idle;
            status.progress = 0.0;
            status.error = None;
        });

        if let Some(metadata) = self.source.metadata().filter(SourceMetadata::is_ready) {
            self.source.pause();
            self.source.seek(metadata.preview_position()).await?;
        }
        debug!("Export session reset");
        Ok(())
    }

    /// Same as [`reset`](Self::reset); running exports are cancelled through a [`CancelHandle`]
    pub async fn cancel(&mut self) -> ReframeResult<()> {
        self.reset().await
    }

    /// Cached or freshly generated background; `None` if cancelled meanwhile
    async fn resolve_background(&mut self, prompt: &str) -> ReframeResult<Option<BackgroundImage>> {
        if let Some((cached_prompt, image)) = &self.generated_background {
            if cached_prompt == prompt {
                debug!("Reusing generated background");
                return Ok(Some(image.clone()));
            }
        }

        let generator = self.generator.clone().ok_or_else(|| {
            ReframeError::BackgroundGeneration("no background generator configured".to_string())
        })?;

        self.transition(ExportState::Idle, ExportState::GeneratingBackground);
        info!("Generating background image");
        let result = generator.generate(prompt).await;

        if self.state() != ExportState::GeneratingBackground {
            return Ok(None);
        }
        let image = result.map_err(|e| match e {
            ReframeError::BackgroundGeneration(_) => e,
            other => ReframeError::BackgroundGeneration(other.to_string()),
        })?;
        self.transition(ExportState::GeneratingBackground, ExportState::Idle);

        self.generated_background = Some((prompt.to_string(), image.clone()));
        Ok(Some(image))
    }

    async fn record(
        &mut self,
        config: &RenderConfig,
        metadata: &SourceMetadata,
    ) -> ReframeResult<ExportOutcome> {
        let format = select_output_format(self.backend.as_ref());
        let encoder_config = EncoderConfig {
            format,
            dimensions: config.target,
            frame_rate: self.settings.frame_rate,
            video_bitrate: self.settings.video_bitrate,
            audio_bitrate: self.settings.audio_bitrate,
        };

        self.artifact = None;
        let entered = self.status.send_if_modified(|status| {
            if status.state == ExportState::Idle {
                status.state = ExportState::Recording;
                status.progress = 0.0;
                status.error = None;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(ReframeError::ExportActive(self.state()));
        }
        self.notify_observers();

        let preview = PreviewState {
            position: self.source.current_time(),
            audio: self.source.audio_settings(),
        };

        let (mut encoder, format) = match self.open_encoder(encoder_config) {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(e, Some(preview)).await),
        };
        let mut session = CaptureSession::new(format, config.target);
        info!(
            session = %session.id(),
            target = %config.target,
            fit = %config.fit_mode,
            "Recording started as {}",
            format
        );

        // Audio has to play to be captured; keep it barely audible
        let monitor = AudioSettings {
            volume: self.settings.monitor_volume,
            muted: false,
        };
        if let Err(e) = self.source.set_audio_settings(monitor) {
            warn!("Could not set monitor volume: {}", e);
        }

        if let Err(e) = self.start_playback().await {
            return Err(self.fail(e, Some(preview)).await);
        }

        let mut notifier = select_notifier(self.source.as_ref(), self.settings.poll_interval());
        let mut canvas = Canvas::new(config.target);
        let budget = self.settings.frame_interval();
        let total = metadata.duration.as_secs_f64();

        loop {
            if self.state() != ExportState::Recording {
                drop(encoder);
                self.abandon(preview, metadata).await;
                return Ok(ExportOutcome::Cancelled);
            }

            let frame = match notifier.next_frame(self.source.as_mut()).await {
                Ok(FrameTick::Frame(frame)) => frame,
                Ok(FrameTick::EndOfStream) => break,
                Err(e) => return Err(self.fail(e, Some(preview)).await),
            };

            let composite_start = Instant::now();
            if let Err(e) = render(&mut canvas, &frame, config) {
                return Err(self.fail(e, Some(preview)).await);
            }
            if let Err(e) = encoder.push_frame(&canvas, frame.timestamp) {
                return Err(self.fail(e, Some(preview)).await);
            }
            session.append(encoder.take_chunks());
            session.record_frame();

            let cost = composite_start.elapsed();
            if cost > budget {
                warn!(
                    frame = session.frames(),
                    cost_ms = cost.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "Frame composite exceeded its budget"
                );
            }

            let fraction = (self.source.current_time().as_secs_f64() / total).min(MAX_LIVE_PROGRESS);
            if let Some(progress) = session.advance_progress(fraction) {
                self.publish_progress(progress);
            }
        }

        debug!(frames = session.frames(), "Source reached end of stream");
        if let Some(progress) = session.advance_progress(1.0) {
            self.publish_progress(progress);
        }

        tokio::time::sleep(self.settings.settle_delay()).await;
        if self.state() != ExportState::Recording {
            drop(encoder);
            self.abandon(preview, metadata).await;
            return Ok(ExportOutcome::Cancelled);
        }

        let tail = match encoder.finish().await {
            Ok(tail) => tail,
            Err(e) => return Err(self.fail(e, Some(preview)).await),
        };
        session.append(tail);
        self.source.pause();

        let artifact = match session.finalize(metadata.stem()) {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail(e, Some(preview)).await),
        };

        if !self.transition(ExportState::Recording, ExportState::Completed) {
            self.abandon(preview, metadata).await;
            return Ok(ExportOutcome::Cancelled);
        }
        let outcome = ExportOutcome::Completed {
            filename: artifact.filename.clone(),
            bytes: artifact.len(),
        };
        info!(
            frames = artifact.frame_count,
            bytes = artifact.len(),
            "Export completed: {}",
            artifact.filename
        );
        self.artifact = Some(artifact);
        self.restore_preview(preview).await;
        Ok(outcome)
    }

    /// Open the encoder, retrying without audio if the merge fails
    fn open_encoder(
        &self,
        mut config: EncoderConfig,
    ) -> ReframeResult<(Box<dyn StreamEncoder>, OutputFormat)> {
        let audio = self.source.audio_track();
        if config.format.audio.is_some() {
            if let Some(track) = &audio {
                match self.backend.open(&config, Some(track)) {
                    Ok(encoder) => return Ok((encoder, config.format)),
                    Err(e) => warn!("Audio track could not be merged, recording video only: {}", e),
                }
            }
            config.format = config.format.video_only();
        }
        let encoder = self.backend.open(&config, None)?;
        Ok((encoder, config.format))
    }

    async fn start_playback(&mut self) -> ReframeResult<()> {
        self.source.seek(Duration::ZERO).await?;
        self.source.play().await.map_err(|e| match e {
            ReframeError::CaptureError(_) => e,
            other => ReframeError::CaptureError(format!("playback could not start: {}", other)),
        })
    }

    /// Clean up after a cancelled recording
    async fn abandon(&mut self, preview: PreviewState, metadata: &SourceMetadata) {
        self.source.pause();
        self.restore_audio(preview.audio);
        if let Err(e) = self.source.seek(metadata.preview_position()).await {
            warn!("Could not park preview: {}", e);
        }
        self.publish(|status| status.progress = 0.0);
        info!("Export cancelled");
    }

    async fn restore_preview(&mut self, preview: PreviewState) {
        self.restore_audio(preview.audio);
        if let Err(e) = self.source.seek(preview.position).await {
            warn!("Could not restore preview position: {}", e);
        }
    }

    fn restore_audio(&mut self, audio: AudioSettings) {
        if let Err(e) = self.source.set_audio_settings(audio) {
            warn!("Could not restore audio settings: {}", e);
        }
    }

    /// End the attempt: back to `Idle` with the error published
    async fn fail(&mut self, err: ReframeError, preview: Option<PreviewState>) -> ReframeError {
        warn!("Export failed: {}", err);
        if let Some(preview) = preview {
            self.source.pause();
            self.restore_preview(preview).await;
        }
        let message = err.to_string();
        self.publish(|status| {
            status.state = ExportState::Idle;
            status.progress = 0.0;
            status.error = Some(message);
        });
        err
    }

    fn publish_progress(&self, fraction: f64) {
        let percent = fraction * 100.0;
        let changed = self.status.send_if_modified(|status| {
            if status.state == ExportState::Recording && percent > status.progress {
                status.progress = percent;
                true
            } else {
                false
            }
        });
        if changed {
            self.notify_observers();
        }
    }

    /// Guarded transition; returns whether it happened
    fn transition(&self, from: ExportState, to: ExportState) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if status.state == from {
                status.state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(%from, %to, "Export state changed");
            self.notify_observers();
        }
        changed
    }

    fn publish(&self, update: impl FnOnce(&mut ExportStatus)) {
        self.status.send_modify(update);
        self.notify_observers();
    }

    fn notify_observers(&self) {
        // Callbacks may cancel, so none may run while the channel is borrowed
        let snapshot = self.status.borrow().clone();
        for callback in &self.observers {
            callback(&snapshot);
        }
    }
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("backend", &self.backend.name())
            .field("status", &*self.status.borrow())
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .field("has_artifact", &self.artifact.is_some())
            .finish()
    }
}
