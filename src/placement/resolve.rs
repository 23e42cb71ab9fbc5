//! Render-time resolution of a stored placement onto a concrete PDF page.

use serde::Serialize;
use std::fmt::Display;

use super::{clamp_font_size, clamp_ratio, Alignment, Placement, Rgb, DEFAULT_RATIO};
use crate::config::RenderDefaults;

/// Page size in PDF points; the origin is the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Text metrics from the engine that will draw the text.
///
/// Widths must come from the final rendering engine; a width measured by the
/// browser preview is never a valid substitute.
pub trait TextMeasure {
    type Error: Display;

    fn text_width(&self, text: &str, font_size: f64) -> Result<f64, Self::Error>;

    /// Ascent-to-descent height of a line at `font_size`.
    fn line_height(&self, font_size: f64) -> f64;
}

/// Final draw parameters for one string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDraw {
    pub ratio_x: f64,
    pub ratio_y: f64,
    pub anchor_x: f64,
    pub anchor_y_from_top: f64,
    pub text_width: f64,
    pub text_height: f64,
    pub draw_x: f64,
    pub draw_y_baseline: f64,
    pub font_size: u32,
    pub alignment: Alignment,
    pub color: Rgb,
}

/// Picks the ratio for one axis: the stored ratio, else `pixel / surface`,
/// else [`DEFAULT_RATIO`].
pub fn effective_ratio(ratio: Option<f64>, pixel: Option<f64>, surface: Option<f64>) -> f64 {
    if let Some(ratio) = ratio.and_then(clamp_ratio) {
        return ratio;
    }
    match (pixel, surface) {
        (Some(pixel), Some(surface)) if surface.is_finite() && surface > 0.0 => {
            clamp_ratio(pixel / surface).unwrap_or(DEFAULT_RATIO)
        }
        _ => DEFAULT_RATIO,
    }
}

pub fn effective_ratios(placement: &Placement) -> (f64, f64) {
    (
        effective_ratio(placement.ratio_x, placement.pixel_x, placement.surface_width),
        effective_ratio(placement.ratio_y, placement.pixel_y, placement.surface_height),
    )
}

/// Anchor on `page`, still measured from the top edge.
pub fn anchor_on_page(placement: &Placement, page: PageSize) -> (f64, f64) {
    let (ratio_x, ratio_y) = effective_ratios(placement);
    (page.width * ratio_x, page.height * ratio_y)
}

pub fn align_x(anchor_x: f64, text_width: f64, alignment: Alignment) -> f64 {
    match alignment {
        Alignment::Left => anchor_x,
        Alignment::Center => anchor_x - text_width / 2.0,
        Alignment::Right => anchor_x - text_width,
    }
}

/// Keeps the run inside `[0, page_width]`. When the text is wider than the
/// page it starts at the left edge.
pub fn clamp_x(draw_x: f64, text_width: f64, page_width: f64) -> f64 {
    draw_x.min(page_width - text_width).max(0.0)
}

fn measured_width<M: TextMeasure>(measure: &M, text: &str, font_size: f64) -> f64 {
    match measure.text_width(text, font_size) {
        Ok(width) if width.is_finite() => width,
        Ok(width) => {
            tracing::warn!(text, width, "non-finite text width; anchoring as zero-width");
            0.0
        }
        Err(e) => {
            tracing::warn!(text, error = %e, "text measurement failed; anchoring as zero-width");
            0.0
        }
    }
}

/// Computes where `text` is drawn on `page` for the given placement.
///
/// Every call measures the actual string, so names of different lengths are
/// each aligned on their own width. Only the horizontal position is clamped;
/// a placement near the bottom edge is allowed to clip.
pub fn resolve<M: TextMeasure>(
    placement: &Placement,
    defaults: &RenderDefaults,
    page: PageSize,
    text: &str,
    measure: &M,
) -> ResolvedDraw {
    let (ratio_x, ratio_y) = effective_ratios(placement);
    let (anchor_x, anchor_y_from_top) = anchor_on_page(placement, page);

    let font_size = placement
        .font_size
        .and_then(|size| clamp_font_size(f64::from(size)).ok())
        .unwrap_or(defaults.font_size);
    let alignment = placement.alignment.unwrap_or(defaults.alignment);
    let color = placement.text_color.unwrap_or(defaults.color);

    let size = f64::from(font_size);
    let text_width = measured_width(measure, text, size);
    let text_height = measure.line_height(size);

    let draw_x = clamp_x(align_x(anchor_x, text_width, alignment), text_width, page.width);
    let draw_y_baseline = page.height - anchor_y_from_top - text_height;

    ResolvedDraw {
        ratio_x,
        ratio_y,
        anchor_x,
        anchor_y_from_top,
        text_width,
        text_height,
        draw_x,
        draw_y_baseline,
        font_size,
        alignment,
        color,
    }
}
