use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use super::Participant;
use crate::roster::RosterEntry;

/// Body of participant create and update requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParticipantInput {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub mes_id: Option<String>,
    pub extra_data: Option<Value>,
}

pub async fn list_participants(pool: &PgPool) -> Result<Vec<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>("SELECT * FROM participants ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

pub async fn count_participants(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM participants")
        .fetch_one(pool)
        .await
}

/// Participants for a generation batch, in id order. An empty `ids` selects
/// everyone.
pub async fn participants_for_batch(pool: &PgPool, ids: &[i64]) -> Result<Vec<Participant>, sqlx::Error> {
    if ids.is_empty() {
        sqlx::query_as::<_, Participant>("SELECT * FROM participants ORDER BY id")
            .fetch_all(pool)
            .await
    } else {
        sqlx::query_as::<_, Participant>("SELECT * FROM participants WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}

pub async fn get_participant(pool: &PgPool, participant_id: i64) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>("SELECT * FROM participants WHERE id = $1")
        .bind(participant_id)
        .fetch_optional(pool)
        .await
}


/// Inserts a manually added participant. A duplicate email surfaces as a
/// unique violation (see [`super::is_unique_violation`]).
pub async fn insert_participant(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    mes_id: Option<&str>,
    extra_data: Option<&Value>,
) -> Result<Participant, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        INSERT INTO participants (full_name, email, mes_id, extra_data, source)
        VALUES ($1, $2, $3, $4, 'manual')
        RETURNING *
        "#,
    )
    .bind(full_name)
    .bind(email)
    .bind(mes_id)
    .bind(extra_data)
    .fetch_one(pool)
    .await
}

pub async fn update_participant(
    pool: &PgPool,
    participant_id: i64,
    full_name: &str,
    email: &str,
    mes_id: Option<&str>,
    extra_data: Option<&Value>,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        UPDATE participants
        SET full_name = $1, email = $2, mes_id = $3, extra_data = $4,
            source = 'manual', updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(full_name)
    .bind(email)
    .bind(mes_id)
    .bind(extra_data)
    .bind(participant_id)
    .fetch_optional(pool)
    .await
}

/// Imported rows replace name, id and extra data of an existing participant
/// with the same email.
pub async fn upsert_imported(
    pool: &PgPool,
    entry: &RosterEntry,
    source: &str,
) -> Result<Participant, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        INSERT INTO participants (full_name, email, mes_id, extra_data, source)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            mes_id = EXCLUDED.mes_id,
            extra_data = EXCLUDED.extra_data,
            source = EXCLUDED.source,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(&entry.full_name)
    .bind(&entry.email)
    .bind(entry.mes_id.as_deref())
    .bind(&entry.extra_data)
    .bind(source)
    .fetch_one(pool)
    .await
}

pub async fn delete_participant(pool: &PgPool, participant_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM participants WHERE id = $1")
        .bind(participant_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_participants(pool: &PgPool, ids: &[i64]) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM participants WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_all_participants(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM participants")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
