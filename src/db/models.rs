use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::placement::{Alignment, Placement, Rgb};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Template {
    pub id: i64,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub stored_path: String,
    pub text_x_ratio: Option<f64>,
    pub text_y_ratio: Option<f64>,
    pub text_x_pixels: Option<f64>,
    pub text_y_pixels: Option<f64>,
    pub canvas_width: Option<f64>,
    pub canvas_height: Option<f64>,
    pub text_font_size: Option<i32>,
    pub text_align: Option<String>,
    pub text_color_hex: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl Template {
    /// The stored placement. Values the database should never hold (bad
    /// alignment or color strings, negative sizes) read back as unset.
    pub fn placement(&self) -> Placement {
        Placement {
            ratio_x: self.text_x_ratio,
            ratio_y: self.text_y_ratio,
            pixel_x: self.text_x_pixels,
            pixel_y: self.text_y_pixels,
            surface_width: self.canvas_width,
            surface_height: self.canvas_height,
            font_size: self.text_font_size.and_then(|size| u32::try_from(size).ok()),
            alignment: self
                .text_align
                .as_deref()
                .and_then(|raw| raw.parse::<Alignment>().ok()),
            text_color: self.text_color_hex.as_deref().and_then(Rgb::parse_hex),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Participant {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub mes_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Text drawn on the certificate: full name, else a `name` column from
    /// the imported row, else a generic label.
    pub fn display_name(&self) -> String {
        let from_extra = || {
            self.extra_data
                .as_ref()?
                .get("name")?
                .as_str()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        };
        match self.full_name.trim() {
            "" => from_extra().unwrap_or_else(|| "Participant".to_string()),
            name => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Pending,
    Generated,
    Failed,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Generated => "generated",
            CertificateStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Certificate {
    pub id: i64,
    pub participant_id: i64,
    pub template_id: i64,
    pub pdf_path: Option<String>,
    pub status: String,
    pub delivery_status: String,
    pub delivery_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A certificate joined with its participant and template names.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CertificateListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub certificate: Certificate,
    pub full_name: String,
    pub email: String,
    pub template_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn participant(full_name: &str, extra: Option<serde_json::Value>) -> Participant {
        Participant {
            id: 1,
            full_name: full_name.to_string(),
            email: "a@example.org".to_string(),
            mes_id: None,
            extra_data: extra,
            source: "manual".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_falls_back_through_extra_data() {
        assert_eq!(participant("Ada", None).display_name(), "Ada");
        assert_eq!(
            participant(" ", Some(json!({ "name": "Grace" }))).display_name(),
            "Grace"
        );
        assert_eq!(participant("", Some(json!({ "team": "x" }))).display_name(), "Participant");
    }

    #[test]
    fn template_row_maps_to_placement() {
        let template = Template {
            id: 1,
            original_name: "award.pdf".into(),
            stored_name: "x.pdf".into(),
            mime_type: "application/pdf".into(),
            file_size: 10,
            stored_path: "templates/x.pdf".into(),
            text_x_ratio: Some(0.5),
            text_y_ratio: None,
            text_x_pixels: None,
            text_y_pixels: Some(120.0),
            canvas_width: None,
            canvas_height: Some(400.0),
            text_font_size: Some(40),
            text_align: Some("right".into()),
            text_color_hex: Some("#FFFFFF".into()),
            uploaded_at: Utc::now(),
        };
        let placement = template.placement();
        assert_eq!(placement.ratio_x, Some(0.5));
        assert_eq!(placement.pixel_y, Some(120.0));
        assert_eq!(placement.font_size, Some(40));
        assert_eq!(placement.alignment, Some(Alignment::Right));
        assert_eq!(placement.text_color, Some(Rgb::new(255, 255, 255)));
    }

    #[test]
    fn status_strings_match_the_column_checks() {
        let migration = include_str!("../../migrations/20240601000000_init.sql");
        for status in [
            CertificateStatus::Pending,
            CertificateStatus::Generated,
            CertificateStatus::Failed,
        ] {
            assert!(migration.contains(&format!("'{}'", status.as_str())));
        }
        for status in [DeliveryStatus::Pending, DeliveryStatus::Sent, DeliveryStatus::Failed] {
            assert!(migration.contains(&format!("'{}'", status.as_str())));
        }
        assert_eq!(CertificateStatus::Pending.as_str(), "pending");
        assert_eq!(DeliveryStatus::Pending.as_str(), "pending");
    }
}
