use super::{clamp_ratio, PlacementError};

/// A click or drag-release on the preview surface, in CSS pixels from its
/// top-left corner, plus the surface's displayed size at that moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capture {
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub surface_width: Option<f64>,
    pub surface_height: Option<f64>,
}

/// The anchor fields of a placement, always written as one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorWrite {
    pub ratio_x: f64,
    pub ratio_y: f64,
    pub pixel_x: Option<f64>,
    pub pixel_y: Option<f64>,
    pub surface_width: Option<f64>,
    pub surface_height: Option<f64>,
}

impl AnchorWrite {
    /// An anchor given directly as ratios. The pixel fallback is cleared so a
    /// stale capture never lingers next to a newer ratio.
    pub fn from_ratio(ratio_x: f64, ratio_y: f64) -> Result<Self, PlacementError> {
        let (Some(ratio_x), Some(ratio_y)) = (clamp_ratio(ratio_x), clamp_ratio(ratio_y)) else {
            return Err(PlacementError::InvalidRatio);
        };
        Ok(Self {
            ratio_x,
            ratio_y,
            pixel_x: None,
            pixel_y: None,
            surface_width: None,
            surface_height: None,
        })
    }
}

fn positive(dimension: Option<f64>) -> Option<f64> {
    dimension.filter(|d| d.is_finite() && *d > 0.0)
}

/// Converts a capture into resolution-independent ratios.
///
/// A missing or zero surface dimension yields
/// [`PlacementError::DegenerateSurface`]; callers keep the previous placement.
pub fn normalize(capture: &Capture) -> Result<AnchorWrite, PlacementError> {
    let (Some(width), Some(height)) = (
        positive(capture.surface_width),
        positive(capture.surface_height),
    ) else {
        return Err(PlacementError::DegenerateSurface {
            width: capture.surface_width,
            height: capture.surface_height,
        });
    };

    let (Some(ratio_x), Some(ratio_y)) = (
        clamp_ratio(capture.pixel_x / width),
        clamp_ratio(capture.pixel_y / height),
    ) else {
        return Err(PlacementError::InvalidPixel);
    };

    Ok(AnchorWrite {
        ratio_x,
        ratio_y,
        pixel_x: Some(capture.pixel_x),
        pixel_y: Some(capture.pixel_y),
        surface_width: Some(width),
        surface_height: Some(height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(px: f64, py: f64, w: Option<f64>, h: Option<f64>) -> Capture {
        Capture {
            pixel_x: px,
            pixel_y: py,
            surface_width: w,
            surface_height: h,
        }
    }

    #[test]
    fn click_becomes_ratio_and_keeps_raw_values() {
        let anchor = normalize(&capture(300.0, 160.0, Some(600.0), Some(400.0))).unwrap();
        assert_eq!(anchor.ratio_x, 0.5);
        assert_eq!(anchor.ratio_y, 0.4);
        assert_eq!(anchor.pixel_x, Some(300.0));
        assert_eq!(anchor.pixel_y, Some(160.0));
        assert_eq!(anchor.surface_width, Some(600.0));
        assert_eq!(anchor.surface_height, Some(400.0));
    }

    #[test]
    fn clicks_outside_the_surface_clamp_to_the_edge() {
        let anchor = normalize(&capture(-12.0, 450.0, Some(600.0), Some(400.0))).unwrap();
        assert_eq!(anchor.ratio_x, 0.0);
        assert_eq!(anchor.ratio_y, 1.0);
        assert_eq!(anchor.pixel_x, Some(-12.0));
    }

    #[test]
    fn zero_or_missing_surface_is_rejected() {
        for (w, h) in [(Some(0.0), Some(400.0)), (Some(600.0), None), (None, None)] {
            let err = normalize(&capture(10.0, 10.0, w, h)).unwrap_err();
            assert!(matches!(err, PlacementError::DegenerateSurface { .. }));
        }
    }

    #[test]
    fn non_finite_pixels_are_rejected() {
        let err = normalize(&capture(f64::NAN, 1.0, Some(10.0), Some(10.0))).unwrap_err();
        assert_eq!(err, PlacementError::InvalidPixel);
    }

    #[test]
    fn ratio_writes_clear_pixel_fallback() {
        let anchor = AnchorWrite::from_ratio(0.25, 1.5).unwrap();
        assert_eq!((anchor.ratio_x, anchor.ratio_y), (0.25, 1.0));
        assert_eq!(anchor.pixel_x, None);
        assert_eq!(anchor.surface_width, None);
    }
}
