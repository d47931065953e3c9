//! Background painting for letterboxed frames
//!
//! Handles the solid fill, the cover-scaled background image and the dim
//! overlay that keeps the foreground legible on top of it.

use crate::compositor::{draw_scaled, Canvas};
use crate::config::BackgroundImage;
use crate::effects::{blend_over, fit_rect, Color, FitMode};

/// Opacity of the black overlay drawn over a background image
pub const IMAGE_OVERLAY_ALPHA: f32 = 0.3;

/// Fill the whole canvas with a solid color
pub fn fill_solid(canvas: &mut Canvas, color: Color) {
    let rgba = color.to_rgba8();
    for chunk in canvas.data_mut().chunks_exact_mut(4) {
        chunk.copy_from_slice(&rgba);
    }
}

/// Draw `image` scaled to cover the canvas, centered, then dim it
pub fn draw_cover_image(canvas: &mut Canvas, image: &BackgroundImage) {
    let target = canvas.dimensions();
    let rect = fit_rect(image.width(), image.height(), target, FitMode::Cover);
    let (width, height) = (canvas.width(), canvas.height());
    draw_scaled(
        canvas.data_mut(),
        width,
        height,
        image.pixels(),
        image.width(),
        image.height(),
        rect,
    );
    apply_overlay(canvas, IMAGE_OVERLAY_ALPHA);
}

/// Composite a translucent black layer over the whole canvas
pub fn apply_overlay(canvas: &mut Canvas, alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    for chunk in canvas.data_mut().chunks_exact_mut(4) {
        blend_over(chunk, [0, 0, 0], alpha);
    }
}
