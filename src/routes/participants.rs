use axum::extract::{Multipart, State};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::{read_upload, JsonBody, PathParam};
use crate::db::{self, ParticipantInput};
use crate::error::{created, ok, ApiError, ApiResult};
use crate::roster::{parse_roster, SheetKind};
use crate::state::AppState;
use crate::storage::Area;

/// Trimmed, non-empty value of an optional text field.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn conflict_or(err: sqlx::Error, message: &str) -> ApiError {
    if db::is_unique_violation(&err) {
        ApiError::Conflict(message.to_string())
    } else {
        err.into()
    }
}

/// Extension of an uploaded sheet without the dot, used as the participant source.
fn sheet_source(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "xlsx".to_string())
}

pub async fn import_participants(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult {
    let upload = read_upload(&mut multipart, "sheet").await?;
    let source = sheet_source(&upload.file_name);

    let stored = state
        .storage
        .save(Area::Data, &upload.bytes, &format!(".{source}"), None)
        .await?;
    let roster = parse_roster(&upload.bytes, SheetKind::from_file_name(&upload.file_name))?;

    let mut processed = 0usize;
    for entry in &roster.entries {
        db::upsert_imported(state.pool.as_ref(), entry, &source).await?;
        processed += 1;
    }

    tracing::info!(
        file = %upload.file_name,
        stored = %stored.relative_path,
        processed,
        skipped = roster.skipped,
        "participants imported"
    );
    Ok(created(json!({
        "storedFile": stored.relative_path,
        "participantsProcessed": processed,
        "participantsSkipped": roster.skipped,
    })))
}

pub async fn list_participants(State(state): State<Arc<AppState>>) -> ApiResult {
    let participants = db::list_participants(state.pool.as_ref()).await?;
    Ok(ok(json!({ "participants": participants })))
}

pub async fn create_participant(
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<ParticipantInput>,
) -> ApiResult {
    let (Some(full_name), Some(email)) = (
        present(input.full_name.as_deref()),
        present(input.email.as_deref()),
    ) else {
        return Err(ApiError::bad_request("Full name and email are required"));
    };
    let email = email.to_lowercase();

    let participant = db::insert_participant(
        state.pool.as_ref(),
        full_name,
        &email,
        present(input.mes_id.as_deref()),
        input.extra_data.as_ref(),
    )
    .await
    .map_err(|e| conflict_or(e, "Participant with this email already exists"))?;

    tracing::info!(participant_id = participant.id, "participant created");
    Ok(created(json!({ "participant": participant })))
}

/// Fields left out of the body keep their current value.
pub async fn update_participant(
    State(state): State<Arc<AppState>>,
    PathParam(participant_id): PathParam<i64>,
    JsonBody(input): JsonBody<ParticipantInput>,
) -> ApiResult {
    let current = db::get_participant(state.pool.as_ref(), participant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Participant not found"))?;

    let full_name = present(input.full_name.as_deref()).unwrap_or(current.full_name.as_str());
    let email = present(input.email.as_deref())
        .map(str::to_lowercase)
        .unwrap_or_else(|| current.email.clone());
    let mes_id = present(input.mes_id.as_deref()).or(current.mes_id.as_deref());
    let extra_data = input.extra_data.as_ref().or(current.extra_data.as_ref());

    let updated = db::update_participant(
        state.pool.as_ref(),
        participant_id,
        full_name,
        &email,
        mes_id,
        extra_data,
    )
    .await
    .map_err(|e| conflict_or(e, "Another participant already uses this email"))?
    .ok_or_else(|| ApiError::not_found("Participant not found"))?;

    tracing::info!(participant_id, "participant updated");
    Ok(ok(json!({ "participant": updated })))
}

pub async fn delete_participant(
    State(state): State<Arc<AppState>>,
    PathParam(participant_id): PathParam<i64>,
) -> ApiResult {
    if !db::delete_participant(state.pool.as_ref(), participant_id).await? {
        return Err(ApiError::not_found("Participant not found"));
    }
    tracing::info!(participant_id, "participant deleted");
    Ok(ok(json!({ "id": participant_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParticipants {
    pub participant_ids: Option<Vec<i64>>,
}

pub async fn delete_participants(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<DeleteParticipants>,
) -> ApiResult {
    let ids = body
        .participant_ids
        .ok_or_else(|| ApiError::bad_request("participantIds array is required"))?;
    let deleted = if ids.is_empty() {
        0
    } else {
        db::delete_participants(state.pool.as_ref(), &ids).await?
    };
    tracing::info!(requested = ids.len(), deleted, "participants deleted");
    Ok(ok(json!({ "deleted": deleted })))
}

pub async fn delete_all_participants(State(state): State<Arc<AppState>>) -> ApiResult {
    let deleted = db::delete_all_participants(state.pool.as_ref()).await?;
    tracing::warn!(deleted, "all participants deleted");
    Ok(ok(json!({ "deleted": deleted })))
}
