use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use serde::Serialize;
use std::sync::Arc;
use tera::Context;

use crate::certificates::export::pdf_url;
use crate::db;
use crate::error::ApiResult;
use crate::state::AppState;

const RECENT_CERTIFICATES: i64 = 20;

#[derive(Serialize)]
struct TemplateRow {
    id: i64,
    name: String,
    uploaded_at: String,
    anchor: Option<String>,
    font_size: Option<i32>,
    align: Option<String>,
    color: Option<String>,
}

#[derive(Serialize)]
struct CertificateRow {
    id: i64,
    participant: String,
    template: String,
    status: String,
    delivery_status: String,
    pdf_url: String,
    updated_at: String,
}

/// Server-rendered overview of templates, participants and recent certificates.
pub async fn index(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let pool = state.pool.as_ref();
    let base = state.config.public_base_url.as_deref();

    let templates: Vec<TemplateRow> = db::list_templates(pool)
        .await?
        .into_iter()
        .map(|t| TemplateRow {
            id: t.id,
            anchor: match (t.text_x_ratio, t.text_y_ratio) {
                (Some(x), Some(y)) => Some(format!("{:.1}% x {:.1}%", x * 100.0, y * 100.0)),
                _ => None,
            },
            name: t.original_name,
            uploaded_at: t.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
            font_size: t.text_font_size,
            align: t.text_align,
            color: t.text_color_hex,
        })
        .collect();

    let certificates: Vec<CertificateRow> = db::recent_certificates(pool, RECENT_CERTIFICATES)
        .await?
        .into_iter()
        .map(|listing| CertificateRow {
            id: listing.certificate.id,
            pdf_url: pdf_url(base, listing.certificate.pdf_path.as_deref()),
            participant: listing.full_name,
            template: listing.template_name,
            status: listing.certificate.status,
            delivery_status: listing.certificate.delivery_status,
            updated_at: listing.certificate.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("templates", &templates);
    ctx.insert("participant_count", &db::count_participants(pool).await?);
    ctx.insert("certificates", &certificates);
    ctx.insert("email_enabled", &state.config.smtp.is_some());

    Ok(render_template("index.html", &ctx))
}

fn render_template(name: &str, ctx: &Context) -> Html<String> {
    match crate::templates::get_tera().render(name, ctx) {
        Ok(rendered) => Html(rendered),
        Err(e) => {
            tracing::error!(template = name, error = %e, "failed to render page");
            Html(format!("Template error: {name}"))
        }
    }
}
