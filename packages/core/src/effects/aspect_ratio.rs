//! Aspect ratio calculations for video frames
//!
//! Provides the target-size preset table, custom dimension handling with an
//! optional aspect lock to the source video, and the fit-mode geometry that
//! maps a source frame onto the target canvas.

use super::{DrawRect, FitMode};
use crate::{ReframeError, ReframeResult};
use serde::{Deserialize, Serialize};

/// Output canvas size in pixels. Both sides are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDimensions")]
pub struct TargetDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize)]
struct RawDimensions {
    width: u32,
    height: u32,
}

impl TryFrom<RawDimensions> for TargetDimensions {
    type Error = ReframeError;

    fn try_from(raw: RawDimensions) -> ReframeResult<Self> {
        Self::new(raw.width, raw.height)
    }
}

impl TargetDimensions {
    /// Create validated dimensions
    pub fn new(width: u32, height: u32) -> ReframeResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReframeError::Configuration(format!(
                "target dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Re-check the invariant; the fields are public
    pub fn validate(&self) -> ReframeResult<()> {
        Self::new(self.width, self.height).map(|_| ())
    }

    /// Width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Number of bytes in an RGBA buffer of this size
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Default for TargetDimensions {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

impl std::fmt::Display for TargetDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Target aspect ratio presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 9:16 portrait (TikTok, Reels, Shorts)
    #[default]
    Vertical9x16,
    /// 16:9 landscape (YouTube, modern displays)
    Horizontal16x9,
    /// 1:1 square (Instagram feed)
    Square,
    /// 4:5 portrait (Instagram portrait)
    Portrait4x5,
    /// 4:3 standard (classic displays)
    Standard4x3,
    /// 21:9 ultrawide (cinemascope)
    Ultrawide21x9,
    /// User-supplied width and height
    Custom,
}

impl AspectRatio {
    /// All presets in display order
    pub const ALL: [AspectRatio; 7] = [
        AspectRatio::Vertical9x16,
        AspectRatio::Horizontal16x9,
        AspectRatio::Square,
        AspectRatio::Portrait4x5,
        AspectRatio::Standard4x3,
        AspectRatio::Ultrawide21x9,
        AspectRatio::Custom,
    ];

    /// Fixed output size for the preset, `None` for `Custom`
    pub fn preset_dimensions(&self) -> Option<TargetDimensions> {
        let (width, height) = match self {
            AspectRatio::Vertical9x16 => (1080, 1920),
            AspectRatio::Horizontal16x9 => (1920, 1080),
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Portrait4x5 => (1080, 1350),
            AspectRatio::Standard4x3 => (1440, 1080),
            AspectRatio::Ultrawide21x9 => (2560, 1080),
            AspectRatio::Custom => return None,
        };
        Some(TargetDimensions { width, height })
    }

    /// Short label, e.g. `9:16`
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Vertical9x16 => "9:16",
            AspectRatio::Horizontal16x9 => "16:9",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Standard4x3 => "4:3",
            AspectRatio::Ultrawide21x9 => "21:9",
            AspectRatio::Custom => "custom",
        }
    }
}

/// Height that keeps `width` at the source aspect ratio
pub fn locked_height(width: u32, source_aspect: f64) -> u32 {
    ((width as f64 / source_aspect).round() as u32).max(1)
}

/// Width that keeps `height` at the source aspect ratio
pub fn locked_width(height: u32, source_aspect: f64) -> u32 {
    ((height as f64 * source_aspect).round() as u32).max(1)
}

/// Parse a dimension typed by the user. Non-numeric or non-positive input yields `None`.
pub fn parse_dimension(input: &str) -> Option<u32> {
    input.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

/// Dimension form state: preset selection plus custom size with aspect lock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionSettings {
    pub preset: AspectRatio,
    pub custom: TargetDimensions,
    /// Keep custom dimensions proportional to the source video
    pub maintain_aspect: bool,
}

impl Default for DimensionSettings {
    fn default() -> Self {
        Self {
            preset: AspectRatio::default(),
            custom: TargetDimensions::default(),
            maintain_aspect: false,
        }
    }
}

impl DimensionSettings {
    /// The dimensions the next export renders at
    pub fn resolve(&self) -> TargetDimensions {
        self.preset.preset_dimensions().unwrap_or(self.custom)
    }

    /// Apply a custom width typed by the user
    ///
    /// Returns `false` and keeps the previous value when the input is not a
    /// positive integer. With the aspect lock on and a known source aspect
    /// ratio, the height follows.
    pub fn set_custom_width(&mut self, input: &str, source_aspect: Option<f64>) -> bool {
        let Some(width) = parse_dimension(input) else {
            return false;
        };
        self.custom.width = width;
        if let Some(aspect) = self.lock_aspect(source_aspect) {
            self.custom.height = locked_height(width, aspect);
        }
        true
    }

    /// Apply a custom height typed by the user, see [`Self::set_custom_width`]
    pub fn set_custom_height(&mut self, input: &str, source_aspect: Option<f64>) -> bool {
        let Some(height) = parse_dimension(input) else {
            return false;
        };
        self.custom.height = height;
        if let Some(aspect) = self.lock_aspect(source_aspect) {
            self.custom.width = locked_width(height, aspect);
        }
        true
    }

    /// Toggle the aspect lock. Turning it on snaps the height to the current width.
    pub fn set_maintain_aspect(&mut self, enabled: bool, source_aspect: Option<f64>) {
        self.maintain_aspect = enabled;
        if let Some(aspect) = self.lock_aspect(source_aspect) {
            self.custom.height = locked_height(self.custom.width, aspect);
        }
    }

    fn lock_aspect(&self, source_aspect: Option<f64>) -> Option<f64> {
        if !self.maintain_aspect {
            return None;
        }
        source_aspect.filter(|a| a.is_finite() && *a > 0.0)
    }
}

/// Compute where the source frame is drawn on the target canvas
///
/// Returns an empty rectangle when the source size is unknown (zero).
///
/// # Examples
/// ```
/// use reframe_core::effects::{fit_rect, FitMode, TargetDimensions};
///
/// let target = TargetDimensions::new(1080, 1080).unwrap();
/// let rect = fit_rect(1920, 1080, target, FitMode::Cover);
/// assert_eq!(rect.width, 1920.0);
/// assert_eq!(rect.x, -420.0);
/// ```
pub fn fit_rect(
    source_width: u32,
    source_height: u32,
    target: TargetDimensions,
    mode: FitMode,
) -> DrawRect {
    if source_width == 0 || source_height == 0 {
        return DrawRect::default();
    }

    let tw = target.width as f64;
    let th = target.height as f64;

    if mode == FitMode::Stretch {
        return DrawRect::new(0.0, 0.0, tw, th);
    }

    let sw = source_width as f64;
    let sh = source_height as f64;
    let scale_x = tw / sw;
    let scale_y = th / sh;
    let scale = match mode {
        FitMode::Cover => scale_x.max(scale_y),
        _ => scale_x.min(scale_y),
    };

    let width = sw * scale;
    let height = sh * scale;
    DrawRect::new((tw - width) / 2.0, (th - height) / 2.0, width, height)
}
