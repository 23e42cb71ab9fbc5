use axum::extract::{Multipart, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::{read_upload, JsonBody, PathParam};
use crate::db::{self, NewTemplate, Template};
use crate::error::{created, ok, ApiError, ApiResult};
use crate::pdf::TemplateSource;
use crate::placement::color::{suggest_text_color, Surface};
use crate::placement::{resolve, PlacementRequest};
use crate::state::AppState;
use crate::storage::{public_url, template_extension, Area};

/// Name drawn by the preview endpoint when none is given.
const PREVIEW_NAME: &str = "Participant Name";

#[derive(Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    template: Template,
    file_url: String,
}

impl TemplateView {
    fn new(template: Template, base_url: Option<&str>) -> Self {
        let file_url = public_url(base_url, &template.stored_path);
        Self { template, file_url }
    }
}

async fn find_template(state: &AppState, template_id: i64) -> ApiResult<Template> {
    db::get_template(state.pool.as_ref(), template_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))
}

pub async fn upload_template(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult {
    let upload = read_upload(&mut multipart, "template").await?;
    let extension = template_extension(&upload.file_name, upload.content_type.as_deref())
        .ok_or_else(|| ApiError::bad_request("Only PDF, JPEG and PNG templates are supported"))?;

    // Reject files that could never be stamped.
    TemplateSource::load(upload.bytes.clone())
        .map_err(|e| ApiError::bad_request(format!("Template could not be read: {e}")))?;

    let stored = state
        .storage
        .save(Area::Templates, &upload.bytes, extension, None)
        .await?;
    let mime_type = mime_guess::from_ext(extension.trim_start_matches('.'))
        .first_raw()
        .unwrap_or("application/octet-stream");

    let template = db::insert_template(
        state.pool.as_ref(),
        &NewTemplate {
            original_name: &upload.file_name,
            stored_name: &stored.stored_name,
            mime_type,
            file_size: upload.bytes.len() as i64,
            stored_path: &stored.relative_path,
        },
    )
    .await?;

    tracing::info!(template_id = template.id, name = %template.original_name, "template uploaded");
    let base = state.config.public_base_url.as_deref();
    Ok(created(json!({ "template": TemplateView::new(template, base) })))
}

pub async fn list_templates(State(state): State<Arc<AppState>>) -> ApiResult {
    let base = state.config.public_base_url.as_deref();
    let templates: Vec<TemplateView> = db::list_templates(state.pool.as_ref())
        .await?
        .into_iter()
        .map(|t| TemplateView::new(t, base))
        .collect();
    Ok(ok(json!({ "templates": templates })))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    PathParam(template_id): PathParam<i64>,
) -> ApiResult {
    let template = find_template(&state, template_id).await?;

    if let Err(e) = state.storage.delete(&template.stored_path).await {
        tracing::warn!(template_id, error = %e, "could not remove template file");
    }
    db::delete_template(state.pool.as_ref(), template_id).await?;

    tracing::info!(template_id, "template deleted");
    Ok(ok(json!({ "id": template_id })))
}

/// Validates and applies a placement edit, then returns the stored row.
pub async fn update_placement(
    State(state): State<Arc<AppState>>,
    PathParam(template_id): PathParam<i64>,
    JsonBody(request): JsonBody<PlacementRequest>,
) -> ApiResult {
    let update = request.validate()?;
    let template = find_template(&state, template_id).await?;

    let next = update.apply_to(&template.placement());
    let saved = db::save_placement(state.pool.as_ref(), template_id, &next)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    tracing::info!(
        template_id,
        ratio_x = ?saved.text_x_ratio,
        ratio_y = ?saved.text_y_ratio,
        font_size = ?saved.text_font_size,
        align = ?saved.text_align,
        "placement saved"
    );
    let base = state.config.public_base_url.as_deref();
    Ok(ok(json!({ "template": TemplateView::new(saved, base) })))
}

#[derive(Debug, Deserialize)]
pub struct ColorRequest {
    pub ratio_x: f64,
    pub ratio_y: f64,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA or RGB bytes of the preview surface.
    pub pixels: Vec<u8>,
}

/// Picks a readable text color from the preview pixels under the anchor and
/// stores it on the template.
pub async fn detect_text_color(
    State(state): State<Arc<AppState>>,
    PathParam(template_id): PathParam<i64>,
    JsonBody(request): JsonBody<ColorRequest>,
) -> ApiResult {
    let surface = Surface::new(request.width, request.height, &request.pixels).ok_or_else(|| {
        ApiError::bad_request("pixels must hold width x height RGB or RGBA values")
    })?;
    let color = suggest_text_color(&surface, request.ratio_x, request.ratio_y)
        .ok_or_else(|| ApiError::bad_request("no pixels to sample around the anchor"))?;

    let template = find_template(&state, template_id).await?;
    let mut placement = template.placement();
    placement.text_color = Some(color);
    let saved = db::save_placement(state.pool.as_ref(), template_id, &placement)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    tracing::info!(template_id, color = %color, "text color detected");
    let base = state.config.public_base_url.as_deref();
    Ok(ok(json!({
        "template": TemplateView::new(saved, base),
        "color": color,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub name: Option<String>,
}

/// Where the server would draw `name` on this template, without rendering.
pub async fn preview_placement(
    State(state): State<Arc<AppState>>,
    PathParam(template_id): PathParam<i64>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult {
    let template = find_template(&state, template_id).await?;
    let bytes = state.storage.read(&template.stored_path).await?;
    let source = TemplateSource::load(bytes)
        .map_err(|e| ApiError::bad_request(format!("Template could not be read: {e}")))?;

    let name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(PREVIEW_NAME);
    let draw = resolve(
        &template.placement(),
        &state.config.render,
        source.page_size(),
        name,
        &source.font(),
    );

    Ok(ok(json!({
        "name": name,
        "page": source.page_size(),
        "draw": draw,
    })))
}
