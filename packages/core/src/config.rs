//! Render and export configuration
//!
//! `RenderConfig` is the read-only snapshot the compositor receives for every
//! frame; `ExportSettings` holds the encoder and capture tunables.

use crate::effects::{Color, FitMode, TargetDimensions};
use crate::{ReframeError, ReframeResult};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Decoded background raster, immutable once created and cheap to clone
#[derive(Clone)]
pub struct BackgroundImage {
    image: Arc<RgbaImage>,
}

impl BackgroundImage {
    /// Wrap an already decoded image
    pub fn new(image: RgbaImage) -> ReframeResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ReframeError::Configuration(
                "background image has no pixels".to_string(),
            ));
        }
        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Build from raw RGBA bytes
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> ReframeResult<Self> {
        let image = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            ReframeError::Configuration(format!(
                "background buffer does not match {width}x{height} RGBA"
            ))
        })?;
        Self::new(image)
    }

    /// Decode PNG/JPEG/WebP bytes, e.g. the payload returned by an image model
    pub fn decode(bytes: &[u8]) -> ReframeResult<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Self::new(image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major RGBA pixels
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

impl std::fmt::Debug for BackgroundImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl PartialEq for BackgroundImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image) || *self.image == *other.image
    }
}

/// Per-export render snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub target: TargetDimensions,
    pub fit_mode: FitMode,
    pub background_color: Color,
    /// Decoded background shown behind letterboxed content
    #[serde(skip)]
    pub background_image: Option<BackgroundImage>,
    /// Prompt for a generated background (only used with `Contain`)
    #[serde(default)]
    pub ai_prompt: String,
    /// Whether a generated background was requested
    #[serde(default)]
    pub ai_background: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::new(TargetDimensions::default())
    }
}

impl RenderConfig {
    pub fn new(target: TargetDimensions) -> Self {
        Self {
            target,
            fit_mode: FitMode::default(),
            background_color: Color::BLACK,
            background_image: None,
            ai_prompt: String::new(),
            ai_background: false,
        }
    }

    pub fn with_fit_mode(mut self, fit_mode: FitMode) -> Self {
        self.fit_mode = fit_mode;
        self
    }

    pub fn with_background_color(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    /// Set the background color from a CSS hex string
    pub fn with_background_hex(mut self, hex: &str) -> ReframeResult<Self> {
        self.background_color = Color::from_hex(hex)?;
        Ok(self)
    }

    pub fn with_background_image(mut self, image: BackgroundImage) -> Self {
        self.background_image = Some(image);
        self
    }

    /// Request a generated background for `prompt`
    pub fn with_ai_background(mut self, prompt: impl Into<String>) -> Self {
        self.ai_background = true;
        self.ai_prompt = prompt.into();
        self
    }

    /// Whether the background image should be drawn (letterbox mode only)
    pub fn uses_background_image(&self) -> bool {
        self.fit_mode == FitMode::Contain && self.background_image.is_some()
    }

    /// Whether a background must be generated before recording can start
    pub fn needs_generated_background(&self) -> bool {
        self.fit_mode == FitMode::Contain
            && self.ai_background
            && self.background_image.is_none()
            && !self.ai_prompt.trim().is_empty()
    }
}

/// Encoder and capture tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Nominal output frame rate
    pub frame_rate: u32,
    /// Target video bitrate in bits per second
    pub video_bitrate: u64,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u64,
    /// Wait between end-of-stream and finalize so the last chunk is flushed
    pub settle_delay_ms: u64,
    /// Playback volume while capturing; kept above zero so audio is still captured
    pub monitor_volume: f32,
    /// Paint interval for sources without per-frame callbacks
    pub poll_interval_ms: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            video_bitrate: 8_000_000, // 8 Mbps
            audio_bitrate: 128_000,   // 128 kbps
            settle_delay_ms: 500,
            monitor_volume: 0.01,
            poll_interval_ms: 16,
        }
    }
}

impl ExportSettings {
    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> ReframeResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ReframeResult<()> {
        if self.frame_rate == 0 {
            return Err(ReframeError::Configuration(
                "frame_rate must be positive".to_string(),
            ));
        }
        if self.video_bitrate == 0 {
            return Err(ReframeError::Configuration(
                "video_bitrate must be positive".to_string(),
            ));
        }
        if !(self.monitor_volume > 0.0 && self.monitor_volume <= 1.0) {
            return Err(ReframeError::Configuration(format!(
                "monitor_volume must be in (0, 1], got {}",
                self.monitor_volume
            )));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Time budget for compositing one frame
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}
