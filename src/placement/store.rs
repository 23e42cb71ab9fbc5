//! Validation for placement saves. The actual row write lives in
//! `db::templates::save_placement`, which always re-reads what it stored.

use serde::{Deserialize, Deserializer};

use super::{
    clamp_font_size, normalize, AnchorWrite, Alignment, Capture, Placement, PlacementError, Rgb,
};

/// Largest difference tolerated between a submitted ratio and the ratio its
/// accompanying pixel capture implies.
const RATIO_AGREEMENT: f64 = 1e-3;

/// Body of `PUT /api/templates/:id/placement`.
///
/// Absent fields keep their stored value. `text_align` and `text_color_hex`
/// may be sent as `null` to clear them (a cleared color means auto-detect).
#[derive(Debug, Default, Deserialize)]
pub struct PlacementRequest {
    pub text_x_pixels: Option<f64>,
    pub text_y_pixels: Option<f64>,
    pub canvas_width: Option<f64>,
    pub canvas_height: Option<f64>,
    pub text_x_ratio: Option<f64>,
    pub text_y_ratio: Option<f64>,
    pub text_font_size: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    pub text_align: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub text_color_hex: Option<Option<String>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing key (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A validated partial update; `None` means leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementUpdate {
    pub anchor: Option<AnchorWrite>,
    pub font_size: Option<u32>,
    pub alignment: Option<Option<Alignment>>,
    pub text_color: Option<Option<Rgb>>,
}

impl PlacementRequest {
    pub fn validate(&self) -> Result<PlacementUpdate, PlacementError> {
        let anchor = self.anchor()?;

        let font_size = self.text_font_size.map(clamp_font_size).transpose()?;

        let alignment = match &self.text_align {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) => Some(Some(raw.parse::<Alignment>()?)),
        };

        let text_color = match &self.text_color_hex {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => Some(Some(
                Rgb::parse_hex(raw).ok_or_else(|| PlacementError::InvalidColor(raw.clone()))?,
            )),
        };

        Ok(PlacementUpdate {
            anchor,
            font_size,
            alignment,
            text_color,
        })
    }

    fn anchor(&self) -> Result<Option<AnchorWrite>, PlacementError> {
        let capture = match (
            self.text_x_pixels,
            self.text_y_pixels,
            self.canvas_width,
            self.canvas_height,
        ) {
            (None, None, None, None) => None,
            (Some(pixel_x), Some(pixel_y), surface_width, surface_height) => Some(Capture {
                pixel_x,
                pixel_y,
                surface_width,
                surface_height,
            }),
            (None, _, _, _) | (_, None, _, _) => {
                return Err(PlacementError::PartialAnchor(
                    "text_x_pixels and text_y_pixels must be sent together",
                ))
            }
        };

        let ratio = match (self.text_x_ratio, self.text_y_ratio) {
            (None, None) => None,
            (Some(x), Some(y)) => Some(AnchorWrite::from_ratio(x, y)?),
            _ => {
                return Err(PlacementError::PartialAnchor(
                    "text_x_ratio and text_y_ratio must be sent together",
                ))
            }
        };

        match (capture, ratio) {
            (None, None) => Ok(None),
            (None, Some(ratio)) => Ok(Some(ratio)),
            (Some(capture), None) => normalize(&capture).map(Some),
            (Some(capture), Some(ratio)) => {
                let captured = normalize(&capture)?;
                let agrees = (captured.ratio_x - ratio.ratio_x).abs() <= RATIO_AGREEMENT
                    && (captured.ratio_y - ratio.ratio_y).abs() <= RATIO_AGREEMENT;
                if !agrees {
                    return Err(PlacementError::ConflictingAnchor {
                        ratio_x: ratio.ratio_x,
                        ratio_y: ratio.ratio_y,
                        pixel_ratio_x: captured.ratio_x,
                        pixel_ratio_y: captured.ratio_y,
                    });
                }
                Ok(Some(AnchorWrite {
                    ratio_x: ratio.ratio_x,
                    ratio_y: ratio.ratio_y,
                    ..captured
                }))
            }
        }
    }
}

impl PlacementUpdate {
    /// The placement that results from applying this update to `current`.
    pub fn apply_to(&self, current: &Placement) -> Placement {
        let mut next = current.clone();
        if let Some(anchor) = &self.anchor {
            next.set_anchor(anchor);
        }
        if let Some(size) = self.font_size {
            next.font_size = Some(size);
        }
        if let Some(alignment) = self.alignment {
            next.alignment = alignment;
        }
        if let Some(color) = self.text_color {
            next.text_color = color;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> PlacementRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn pixel_capture_is_normalized_with_its_surface() {
        let update = request(json!({
            "text_x_pixels": 150.0,
            "text_y_pixels": 100.0,
            "canvas_width": 600.0,
            "canvas_height": 400.0,
            "text_font_size": 40,
            "text_align": "Left",
            "text_color_hex": "#FFFFFF"
        }))
        .validate()
        .unwrap();

        let anchor = update.anchor.unwrap();
        assert_eq!((anchor.ratio_x, anchor.ratio_y), (0.25, 0.25));
        assert_eq!(anchor.surface_width, Some(600.0));
        assert_eq!(update.font_size, Some(40));
        assert_eq!(update.alignment, Some(Some(Alignment::Left)));
        assert_eq!(update.text_color, Some(Some(Rgb::new(255, 255, 255))));
    }

    #[test]
    fn zero_width_canvas_fails_without_touching_placement() {
        let err = request(json!({
            "text_x_pixels": 10.0,
            "text_y_pixels": 10.0,
            "canvas_width": 0,
            "canvas_height": 400
        }))
        .validate()
        .unwrap_err();
        assert!(matches!(err, PlacementError::DegenerateSurface { .. }));
    }

    #[test]
    fn half_an_anchor_is_rejected() {
        let err = request(json!({ "text_x_pixels": 10.0, "canvas_width": 100 }))
            .validate()
            .unwrap_err();
        assert!(matches!(err, PlacementError::PartialAnchor(_)));

        let err = request(json!({ "text_y_ratio": 0.3 })).validate().unwrap_err();
        assert!(matches!(err, PlacementError::PartialAnchor(_)));
    }

    #[test]
    fn ratio_and_capture_must_agree() {
        let body = |ratio_x: f64| {
            json!({
                "text_x_pixels": 300.0,
                "text_y_pixels": 200.0,
                "canvas_width": 600.0,
                "canvas_height": 400.0,
                "text_x_ratio": ratio_x,
                "text_y_ratio": 0.5
            })
        };
        assert!(request(body(0.5)).validate().is_ok());
        assert!(matches!(
            request(body(0.8)).validate(),
            Err(PlacementError::ConflictingAnchor { .. })
        ));
    }

    #[test]
    fn absent_fields_keep_stored_values_and_null_clears() {
        let current = Placement {
            font_size: Some(48),
            alignment: Some(Alignment::Right),
            text_color: Some(Rgb::new(1, 2, 3)),
            ..Placement::with_ratio(0.1, 0.2)
        };

        let untouched = request(json!({})).validate().unwrap().apply_to(&current);
        assert_eq!(untouched, current);

        let cleared = request(json!({ "text_color_hex": null, "text_align": null }))
            .validate()
            .unwrap()
            .apply_to(&current);
        assert_eq!(cleared.text_color, None);
        assert_eq!(cleared.alignment, None);
        assert_eq!(cleared.font_size, Some(48));
        assert_eq!(cleared.ratio_x, Some(0.1));
    }

    #[test]
    fn new_capture_replaces_ratio_and_pixels_together() {
        let current = Placement {
            ratio_x: Some(0.9),
            ratio_y: Some(0.9),
            pixel_x: Some(900.0),
            pixel_y: Some(900.0),
            surface_width: Some(1000.0),
            surface_height: Some(1000.0),
            ..Placement::default()
        };
        let next = request(json!({ "text_x_ratio": 0.5, "text_y_ratio": 0.4 }))
            .validate()
            .unwrap()
            .apply_to(&current);
        assert_eq!((next.ratio_x, next.ratio_y), (Some(0.5), Some(0.4)));
        assert_eq!(next.pixel_x, None);
        assert_eq!(next.surface_height, None);
    }

    #[test]
    fn invalid_color_and_alignment_are_reported() {
        assert!(matches!(
            request(json!({ "text_color_hex": "red" })).validate(),
            Err(PlacementError::InvalidColor(_))
        ));
        assert!(matches!(
            request(json!({ "text_align": "justify" })).validate(),
            Err(PlacementError::InvalidAlignment(_))
        ));
    }

    #[test]
    fn font_size_is_clamped() {
        let update = request(json!({ "text_font_size": 200 })).validate().unwrap();
        assert_eq!(update.font_size, Some(96));
    }
}
