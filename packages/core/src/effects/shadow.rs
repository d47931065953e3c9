//! Drop shadow behind letterboxed content
//!
//! The shadow of an axis-aligned rectangle under a gaussian blur is separable,
//! so it is computed as the product of two 1-D coverage profiles instead of
//! blurring a full-frame mask.

use crate::compositor::Canvas;
use crate::effects::{blend_over, Color, DrawRect};
use serde::{Deserialize, Serialize};

/// Shadow effect configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Horizontal shadow offset in pixels
    pub offset_x: f64,
    /// Vertical shadow offset in pixels
    pub offset_y: f64,
    /// Blur radius in pixels (gaussian sigma is half of it)
    pub blur_radius: f64,
    /// Shadow color
    pub color: Color,
    /// Shadow opacity (0.0-1.0)
    pub opacity: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 10.0,
            blur_radius: 30.0,
            color: Color::BLACK,
            opacity: 0.5,
        }
    }
}

/// Paint the shadow of `rect` onto the canvas
pub fn draw_drop_shadow(canvas: &mut Canvas, rect: DrawRect, config: &ShadowConfig) {
    let opacity = (config.opacity * config.color.a).clamp(0.0, 1.0);
    if opacity <= 0.0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }

    let (width, height) = (canvas.width(), canvas.height());
    let kernel = gaussian_kernel(config.blur_radius);
    let px = coverage_profile(
        width,
        rect.x + config.offset_x,
        rect.right() + config.offset_x,
        &kernel,
    );
    let py = coverage_profile(
        height,
        rect.y + config.offset_y,
        rect.bottom() + config.offset_y,
        &kernel,
    );

    let [r, g, b, _] = config.color.to_rgba8();
    let data = canvas.data_mut();
    for (y, cy) in py.iter().enumerate() {
        if *cy <= 0.0 {
            continue;
        }
        let row = y * width as usize * 4;
        for (x, cx) in px.iter().enumerate() {
            let alpha = opacity * (*cx * *cy) as f32;
            if alpha < 1.0 / 512.0 {
                continue;
            }
            let idx = row + x * 4;
            blend_over(&mut data[idx..idx + 4], [r, g, b], alpha);
        }
    }
}

/// Normalized gaussian weights for a blur radius; a single tap when unblurred
fn gaussian_kernel(blur_radius: f64) -> Vec<f64> {
    if !blur_radius.is_finite() || blur_radius < 1.0 {
        return vec![1.0];
    }
    let sigma = blur_radius / 2.0;
    let r = (sigma * 3.0).ceil() as i64;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f64> = (-r..=r)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Blurred coverage of `[start, end)` sampled at each pixel center in `0..len`
fn coverage_profile(len: u32, start: f64, end: f64, kernel: &[f64]) -> Vec<f64> {
    let r = (kernel.len() / 2) as i64;
    let inside = |i: i64| {
        let center = i as f64 + 0.5;
        center >= start && center < end
    };
    (0..len as i64)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter(|(k, _)| inside(i + *k as i64 - r))
                .map(|(_, w)| *w)
                .sum::<f64>()
                .min(1.0)
        })
        .collect()
}
