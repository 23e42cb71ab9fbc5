use axum::{
    extract::State,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::{attachment, JsonBody, PathParam};
use crate::certificates::export::{listings_to_csv, listings_to_xlsx, pdf_url, zip_certificates};
use crate::certificates::{BatchRequest, Generator};
use crate::db::{self, CertificateListing};
use crate::error::{created, ok, ApiError, ApiResult};
use crate::mail::{CertificateEmail, CertificateMailer, EmailOptions};
use crate::state::AppState;

async fn find_listing(state: &AppState, certificate_id: i64) -> ApiResult<CertificateListing> {
    db::get_certificate_listing(state.pool.as_ref(), certificate_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Certificate not found"))
}

pub async fn list_certificates(State(state): State<Arc<AppState>>) -> ApiResult {
    let base = state.config.public_base_url.as_deref();
    let mut certificates = db::list_certificates(state.pool.as_ref()).await?;
    for listing in &mut certificates {
        let cert = &mut listing.certificate;
        if let Some(path) = cert.pdf_path.take() {
            cert.pdf_path = Some(pdf_url(base, Some(&path)));
        }
    }
    Ok(ok(json!({ "certificates": certificates })))
}

pub async fn generate_certificates(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<BatchRequest>,
) -> ApiResult {
    if request.template_id <= 0 {
        return Err(ApiError::bad_request("templateId is required"));
    }

    let generator = Generator {
        ledger: state.pool.as_ref(),
        mailer: &state.mailer,
        storage: &state.storage,
        defaults: &state.config.render,
    };
    let summary = generator.run(&request).await?;
    Ok(created(summary))
}

/// Resends a generated certificate, optionally with a custom subject and body.
pub async fn send_certificate(
    State(state): State<Arc<AppState>>,
    PathParam(certificate_id): PathParam<i64>,
    options: Option<Json<EmailOptions>>,
) -> ApiResult {
    let options = options.map(|Json(o)| o).unwrap_or_default();
    let listing = find_listing(&state, certificate_id).await?;
    let cert = &listing.certificate;

    let pdf_path = cert
        .pdf_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Certificate PDF has not been generated"))?;
    let pdf = state.storage.read(pdf_path).await?;

    let email = CertificateEmail::compose(
        cert.participant_id,
        &listing.full_name,
        Some(&listing.email),
        Some(pdf_path),
        pdf,
        &options,
    )?;

    if let Err(e) = state.mailer.send(email).await {
        db::mark_delivery_failed(state.pool.as_ref(), certificate_id, &e.to_string()).await?;
        return Err(e.into());
    }
    db::mark_sent(state.pool.as_ref(), certificate_id).await?;

    tracing::info!(certificate_id, to = %listing.email, "certificate sent");
    Ok(ok(json!({ "certificateId": certificate_id, "status": "sent" })))
}

pub async fn export_certificates(State(state): State<Arc<AppState>>) -> ApiResult {
    let listings = db::list_certificates(state.pool.as_ref()).await?;
    let csv = listings_to_csv(&listings, state.config.public_base_url.as_deref())
        .map_err(|e| ApiError::Internal(format!("failed to write CSV: {e}")))?;

    let file_name = format!(
        "certificate-dispatch-{}.csv",
        chrono::Utc::now().timestamp_millis()
    );
    Ok(attachment("text/csv", &file_name, csv))
}

pub async fn export_certificates_excel(State(state): State<Arc<AppState>>) -> ApiResult {
    let listings = db::list_certificates(state.pool.as_ref()).await?;
    let workbook = listings_to_xlsx(&listings, state.config.public_base_url.as_deref())
        .map_err(|e| ApiError::Internal(format!("failed to write workbook: {e}")))?;

    let file_name = format!(
        "certificate-dispatch-{}.xlsx",
        chrono::Utc::now().timestamp_millis()
    );
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &file_name,
        workbook,
    ))
}

pub async fn download_certificate(
    State(state): State<Arc<AppState>>,
    PathParam(certificate_id): PathParam<i64>,
) -> ApiResult {
    let listing = find_listing(&state, certificate_id).await?;
    let pdf_path = listing
        .certificate
        .pdf_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::not_found("Certificate PDF has not been generated"))?;

    let pdf = state.storage.read(pdf_path).await?;
    Ok(attachment(
        "application/pdf",
        &format!("certificate-{certificate_id}.pdf"),
        pdf,
    ))
}

/// Every generated certificate of a template in one archive. Files that can
/// no longer be read are left out.
pub async fn download_template_archive(
    State(state): State<Arc<AppState>>,
    PathParam(template_id): PathParam<i64>,
) -> ApiResult {
    let template = db::get_template(state.pool.as_ref(), template_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;
    let listings = db::generated_for_template(state.pool.as_ref(), template_id).await?;

    let mut files = Vec::with_capacity(listings.len());
    for listing in &listings {
        let Some(path) = listing.certificate.pdf_path.as_deref() else {
            continue;
        };
        match state.storage.read(path).await {
            Ok(pdf) => files.push((listing, pdf)),
            Err(e) => tracing::warn!(
                certificate_id = listing.certificate.id,
                error = %e,
                "skipping unreadable certificate"
            ),
        }
    }
    if files.is_empty() {
        return Err(ApiError::not_found("No generated certificates for this template"));
    }

    let archive = zip_certificates(&files)
        .map_err(|e| ApiError::Internal(format!("failed to build archive: {e}")))?;
    tracing::info!(template_id, files = files.len(), "certificate archive built");

    let stem = std::path::Path::new(&template.original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("template");
    Ok(attachment(
        "application/zip",
        &format!("{}-certificates.zip", crate::storage::slugify(stem)),
        archive,
    ))
}
