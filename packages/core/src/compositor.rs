//! Frame compositor
//!
//! Paints one source frame onto the target canvas: background fill, optional
//! background image, drop shadow (letterbox only), then the scaled frame.
//! Rendering is a pure function of the frame and the [`RenderConfig`].

use crate::config::RenderConfig;
use crate::effects::background::{draw_cover_image, fill_solid};
use crate::effects::shadow::{draw_drop_shadow, ShadowConfig};
use crate::effects::{blend_over, fit_rect, DrawRect, FitMode, TargetDimensions};
use crate::playback::VideoFrame;
use crate::{ReframeError, ReframeResult};

/// Output drawing surface (RGBA, row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    dimensions: TargetDimensions,
    data: Vec<u8>,
}

impl Canvas {
    /// Transparent canvas of the given size
    pub fn new(dimensions: TargetDimensions) -> Self {
        Self {
            dimensions,
            data: vec![0; dimensions.rgba_len()],
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn dimensions(&self) -> TargetDimensions {
        self.dimensions
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// RGBA value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = ((y * self.width() + x) * 4) as usize;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + 4]);
        Some(px)
    }
}

/// Composite `source` onto `canvas` according to `config`
///
/// Every pixel of the canvas is rewritten, so a canvas can be reused across
/// frames without clearing.
pub fn render(canvas: &mut Canvas, source: &VideoFrame, config: &RenderConfig) -> ReframeResult<()> {
    if !source.is_well_formed() {
        return Err(ReframeError::CaptureError(format!(
            "malformed frame: {}x{} with {} bytes",
            source.width,
            source.height,
            source.data.len()
        )));
    }
    if canvas.dimensions() != config.target {
        return Err(ReframeError::Configuration(format!(
            "canvas is {} but the target is {}",
            canvas.dimensions(),
            config.target
        )));
    }

    fill_solid(canvas, config.background_color);
    if config.uses_background_image() {
        if let Some(image) = &config.background_image {
            draw_cover_image(canvas, image);
        }
    }

    let rect = fit_rect(source.width, source.height, config.target, config.fit_mode);
    if config.fit_mode == FitMode::Contain {
        draw_drop_shadow(canvas, rect, &ShadowConfig::default());
    }

    let (width, height) = (canvas.width(), canvas.height());
    draw_scaled(
        canvas.data_mut(),
        width,
        height,
        &source.data,
        source.width,
        source.height,
        rect,
    );
    Ok(())
}

/// Bilinear-scale an RGBA image into `rect` of the destination, clipped to its bounds
///
/// Opaque source pixels are copied; translucent ones are blended over what is
/// already there.
pub(crate) fn draw_scaled(
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    rect: DrawRect,
) {
    if src_width == 0 || src_height == 0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    if src.len() < (src_width * src_height * 4) as usize {
        return;
    }

    let x_start = rect.x.round().max(0.0) as u32;
    let y_start = rect.y.round().max(0.0) as u32;
    let x_end = (rect.right().round().max(0.0) as u32).min(dst_width);
    let y_end = (rect.bottom().round().max(0.0) as u32).min(dst_height);

    let x_ratio = src_width as f64 / rect.width;
    let y_ratio = src_height as f64 / rect.height;
    let max_x = (src_width - 1) as f64;
    let max_y = (src_height - 1) as f64;

    for y in y_start..y_end {
        // Map the destination pixel center into source pixel space
        let src_y = ((y as f64 + 0.5 - rect.y) * y_ratio - 0.5).clamp(0.0, max_y);
        let y0 = src_y as u32;
        let y1 = (y0 + 1).min(src_height - 1);
        let fy = (src_y - y0 as f64) as f32;

        for x in x_start..x_end {
            let src_x = ((x as f64 + 0.5 - rect.x) * x_ratio - 0.5).clamp(0.0, max_x);
            let x0 = src_x as u32;
            let x1 = (x0 + 1).min(src_width - 1);
            let fx = (src_x - x0 as f64) as f32;

            let idx00 = ((y0 * src_width + x0) * 4) as usize;
            let idx10 = ((y0 * src_width + x1) * 4) as usize;
            let idx01 = ((y1 * src_width + x0) * 4) as usize;
            let idx11 = ((y1 * src_width + x1) * 4) as usize;

            let mut px = [0u8; 4];
            for (c, out) in px.iter_mut().enumerate() {
                let v00 = src[idx00 + c] as f32;
                let v10 = src[idx10 + c] as f32;
                let v01 = src[idx01 + c] as f32;
                let v11 = src[idx11 + c] as f32;

                let v0 = v00 + fx * (v10 - v00);
                let v1 = v01 + fx * (v11 - v01);
                *out = (v0 + fy * (v1 - v0)).round() as u8;
            }

            let dst_idx = ((y * dst_width + x) * 4) as usize;
            let dst_px = &mut dst[dst_idx..dst_idx + 4];
            if px[3] == 255 {
                dst_px.copy_from_slice(&px);
            } else {
                blend_over(dst_px, [px[0], px[1], px[2]], px[3] as f32 / 255.0);
            }
        }
    }
}
