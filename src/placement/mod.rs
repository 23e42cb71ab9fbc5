//! Name placement: capturing an anchor on the preview canvas, persisting it
//! per template, and turning it back into a PDF draw position.
//!
//! Anchors are stored as ratios of the capture surface measured from its
//! top-left corner, together with the raw pixel/surface values they were
//! derived from. PDF pages use a bottom-left origin, so the vertical axis is
//! flipped only at render time.

pub mod color;
pub mod normalize;
pub mod resolve;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use normalize::{normalize, AnchorWrite, Capture};
pub use resolve::{resolve, PageSize, ResolvedDraw, TextMeasure};
pub use store::PlacementRequest;

pub const FONT_SIZE_MIN: u32 = 12;
pub const FONT_SIZE_MAX: u32 = 96;

/// Ratio used on either axis when nothing usable is stored.
pub const DEFAULT_RATIO: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum PlacementError {
    #[error("capture surface must have a positive width and height (got {width:?} x {height:?})")]
    DegenerateSurface {
        width: Option<f64>,
        height: Option<f64>,
    },
    #[error("pixel coordinates must be finite numbers")]
    InvalidPixel,
    #[error("anchor ratios must be finite numbers")]
    InvalidRatio,
    #[error("incomplete anchor update: {0}")]
    PartialAnchor(&'static str),
    #[error("anchor ratio ({ratio_x}, {ratio_y}) disagrees with pixel capture ({pixel_ratio_x}, {pixel_ratio_y})")]
    ConflictingAnchor {
        ratio_x: f64,
        ratio_y: f64,
        pixel_ratio_x: f64,
        pixel_ratio_y: f64,
    },
    #[error("unsupported alignment {0:?}; expected left, center or right")]
    InvalidAlignment(String),
    #[error("invalid color {0:?}; expected six hex digits")]
    InvalidColor(String),
    #[error("font size must be a finite number")]
    InvalidFontSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

impl FromStr for Alignment {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Alignment::Left),
            "center" => Ok(Alignment::Center),
            "right" => Ok(Alignment::Right),
            _ => Err(PlacementError::InvalidAlignment(s.to_string())),
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 8-bit sRGB color, persisted as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Accepts `rrggbb` with or without a leading `#`, case-insensitive.
    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Channels in the 0..=1 range PDF color operators expect.
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        )
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Everything stored about where and how a template's name is drawn.
///
/// A freshly uploaded template has every field unset, which resolves to the
/// page center with the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Placement {
    pub ratio_x: Option<f64>,
    pub ratio_y: Option<f64>,
    pub pixel_x: Option<f64>,
    pub pixel_y: Option<f64>,
    pub surface_width: Option<f64>,
    pub surface_height: Option<f64>,
    pub font_size: Option<u32>,
    pub alignment: Option<Alignment>,
    pub text_color: Option<Rgb>,
}

impl Placement {
    #[cfg(test)]
    pub fn with_ratio(ratio_x: f64, ratio_y: f64) -> Self {
        Self {
            ratio_x: Some(ratio_x),
            ratio_y: Some(ratio_y),
            ..Self::default()
        }
    }

    /// Writes an anchor capture, replacing ratio and pixel fields together.
    pub fn set_anchor(&mut self, anchor: &AnchorWrite) {
        self.ratio_x = Some(anchor.ratio_x);
        self.ratio_y = Some(anchor.ratio_y);
        self.pixel_x = anchor.pixel_x;
        self.pixel_y = anchor.pixel_y;
        self.surface_width = anchor.surface_width;
        self.surface_height = anchor.surface_height;
    }
}

pub fn clamp_font_size(size: f64) -> Result<u32, PlacementError> {
    if !size.is_finite() {
        return Err(PlacementError::InvalidFontSize);
    }
    Ok((size.round() as i64).clamp(i64::from(FONT_SIZE_MIN), i64::from(FONT_SIZE_MAX)) as u32)
}

/// Clamps into `[0, 1]`; `None` for NaN and infinities.
pub fn clamp_ratio(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}
