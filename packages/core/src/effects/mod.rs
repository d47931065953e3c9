//! Frame effects for Reframe video processing
//!
//! This module provides the building blocks the compositor paints with:
//! - Target geometry (aspect ratio presets, fit rectangles)
//! - Background fill with optional cover-scaled image and dim overlay
//! - Drop shadow behind letterboxed content
//!
//! Every function here is pure: same inputs, same pixels.

use crate::{ReframeError, ReframeResult};
use serde::{Deserialize, Serialize};

pub mod aspect_ratio;
pub mod background;
pub mod shadow;

pub use aspect_ratio::{fit_rect, AspectRatio, DimensionSettings, TargetDimensions};

/// How the source frame is mapped onto a differently-shaped target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Preserve aspect ratio, pad the remainder (letterbox/pillarbox)
    #[default]
    Contain,
    /// Preserve aspect ratio, fill the target and crop the overflow
    Cover,
    /// Ignore the source aspect ratio and fill the target exactly
    Stretch,
}

impl std::fmt::Display for FitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitMode::Contain => write!(f, "contain"),
            FitMode::Cover => write!(f, "cover"),
            FitMode::Stretch => write!(f, "stretch"),
        }
    }
}

/// Destination rectangle in canvas pixels
///
/// Coordinates are fractional and may extend past the canvas (cover mode
/// produces negative offsets); drawing clips to the canvas bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DrawRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Whether the rectangle lies inside `(0, 0, width, height)` within `tolerance`
    pub fn fits_within(&self, width: f64, height: f64, tolerance: f64) -> bool {
        self.x >= -tolerance
            && self.y >= -tolerance
            && self.right() <= width + tolerance
            && self.bottom() <= height + tolerance
    }

    /// Whether the rectangle covers `(0, 0, width, height)` within `tolerance`
    pub fn covers(&self, width: f64, height: f64, tolerance: f64) -> bool {
        self.x <= tolerance
            && self.y <= tolerance
            && self.right() >= width - tolerance
            && self.bottom() >= height - tolerance
    }
}

/// RGBA color (0.0-1.0 range)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    /// Parse a CSS hex color: `#rgb`, `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(hex: &str) -> ReframeResult<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || ReframeError::Configuration(format!("invalid hex color: {hex}"));

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());

        match digits.len() {
            3 => {
                let mut channels = [0u8; 3];
                for (i, c) in digits.chars().enumerate() {
                    let v = byte(&c.to_string())?;
                    channels[i] = v * 17;
                }
                Ok(Self::rgba_u8(channels[0], channels[1], channels[2], 255))
            }
            6 => Ok(Self::rgba_u8(
                byte(&digits[0..2])?,
                byte(&digits[2..4])?,
                byte(&digits[4..6])?,
                255,
            )),
            8 => Ok(Self::rgba_u8(
                byte(&digits[0..2])?,
                byte(&digits[2..4])?,
                byte(&digits[4..6])?,
                byte(&digits[6..8])?,
            )),
            _ => Err(invalid()),
        }
    }

    /// Convert to 8-bit RGBA channels
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

/// Source-over blend of a straight-alpha color into an opaque-ish RGBA pixel
#[inline]
pub(crate) fn blend_over(dst: &mut [u8], rgb: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let inv = 1.0 - alpha;
    for i in 0..3 {
        let v = rgb[i] as f32 * alpha + dst[i] as f32 * inv;
        dst[i] = v.round() as u8;
    }
    let a = 255.0 * alpha + dst[3] as f32 * inv;
    dst[3] = a.round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_constructors() {
        let white = Color::WHITE;
        assert_eq!(white.r, 1.0);
        assert_eq!(white.a, 1.0);

        let semi = Color::rgba_u8(255, 128, 0, 128);
        assert!((semi.r - 1.0).abs() < 0.01);
        assert!((semi.g - 0.5).abs() < 0.01);
        assert!((semi.a - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#000000").unwrap().to_rgba8(), [0, 0, 0, 255]);
        assert_eq!(
            Color::from_hex("#1a2b3c").unwrap().to_rgba8(),
            [0x1a, 0x2b, 0x3c, 255]
        );
        assert_eq!(Color::from_hex("#fff").unwrap().to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(
            Color::from_hex("ff000080").unwrap().to_rgba8(),
            [255, 0, 0, 128]
        );
    }

    #[test]
    fn test_color_from_hex_rejects_garbage() {
        assert!(Color::from_hex("#12").is_err());
        assert!(Color::from_hex("#gg0000").is_err());
        assert!(Color::from_hex("").is_err());
        assert!(Color::from_hex("#ééé").is_err());
    }

    #[test]
    fn test_blend_over() {
        let mut px = [200u8, 100, 0, 255];
        blend_over(&mut px, [0, 0, 0], 0.5);
        assert_eq!(px, [100, 50, 0, 255]);

        let mut untouched = [10u8, 20, 30, 255];
        blend_over(&mut untouched, [255, 255, 255], 0.0);
        assert_eq!(untouched, [10, 20, 30, 255]);
    }

    #[test]
    fn test_draw_rect_bounds() {
        let inside = DrawRect::new(0.0, 420.0, 1080.0, 607.5);
        assert!(inside.fits_within(1080.0, 1080.0, 1e-6));
        assert!(!inside.covers(1080.0, 1080.0, 1e-6));

        let over = DrawRect::new(-420.0, 0.0, 1920.0, 1080.0);
        assert!(over.covers(1080.0, 1080.0, 1e-6));
        assert!(!over.fits_within(1080.0, 1080.0, 1e-6));
    }

    #[test]
    fn test_fit_mode_serialization() {
        let json = serde_json::to_string(&FitMode::Cover).unwrap();
        assert_eq!(json, "\"cover\"");
        let mode: FitMode = serde_json::from_str("\"stretch\"").unwrap();
        assert_eq!(mode, FitMode::Stretch);
    }
}
