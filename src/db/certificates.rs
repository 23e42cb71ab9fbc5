use sqlx::PgPool;

use super::{Certificate, CertificateListing, CertificateStatus, DeliveryStatus};

/// Returns the certificate row for a participant/template pair, creating a
/// pending one on first use.
pub async fn ensure_certificate(
    pool: &PgPool,
    participant_id: i64,
    template_id: i64,
) -> Result<Certificate, sqlx::Error> {
    sqlx::query_as::<_, Certificate>(
        r#"
        INSERT INTO certificates (participant_id, template_id, status, delivery_status)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (participant_id, template_id) DO UPDATE
        SET updated_at = certificates.updated_at
        RETURNING *
        "#,
    )
    .bind(participant_id)
    .bind(template_id)
    .bind(CertificateStatus::Pending.as_str())
    .bind(DeliveryStatus::Pending.as_str())
    .fetch_one(pool)
    .await
}

pub async fn mark_generated(pool: &PgPool, certificate_id: i64, pdf_path: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE certificates
        SET status = $1, pdf_path = $2, last_error = NULL, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(CertificateStatus::Generated.as_str())
    .bind(pdf_path)
    .bind(certificate_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, certificate_id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE certificates
        SET status = $1, last_error = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(CertificateStatus::Failed.as_str())
    .bind(message)
    .bind(certificate_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_sent(pool: &PgPool, certificate_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE certificates
        SET delivery_status = $1, delivery_message = NULL, sent_at = NOW(), updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(DeliveryStatus::Sent.as_str())
    .bind(certificate_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_delivery_failed(
    pool: &PgPool,
    certificate_id: i64,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE certificates
        SET delivery_status = $1, delivery_message = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(DeliveryStatus::Failed.as_str())
    .bind(message)
    .bind(certificate_id)
    .execute(pool)
    .await?;
    Ok(())
}

const LISTING_SELECT: &str = r#"
    SELECT c.*, p.full_name, p.email, t.original_name AS template_name
    FROM certificates c
    JOIN participants p ON p.id = c.participant_id
    JOIN templates t ON t.id = c.template_id
"#;

pub async fn list_certificates(pool: &PgPool) -> Result<Vec<CertificateListing>, sqlx::Error> {
    sqlx::query_as::<_, CertificateListing>(&format!(
        "{LISTING_SELECT} ORDER BY c.updated_at DESC, c.id DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn recent_certificates(pool: &PgPool, limit: i64) -> Result<Vec<CertificateListing>, sqlx::Error> {
    sqlx::query_as::<_, CertificateListing>(&format!(
        "{LISTING_SELECT} ORDER BY c.updated_at DESC, c.id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn get_certificate_listing(
    pool: &PgPool,
    certificate_id: i64,
) -> Result<Option<CertificateListing>, sqlx::Error> {
    sqlx::query_as::<_, CertificateListing>(&format!("{LISTING_SELECT} WHERE c.id = $1"))
        .bind(certificate_id)
        .fetch_optional(pool)
        .await
}

/// Generated certificates of one template, for archive download.
pub async fn generated_for_template(
    pool: &PgPool,
    template_id: i64,
) -> Result<Vec<CertificateListing>, sqlx::Error> {
    sqlx::query_as::<_, CertificateListing>(&format!(
        "{LISTING_SELECT} WHERE c.template_id = $1 AND c.status = 'generated' AND c.pdf_path IS NOT NULL ORDER BY c.id"
    ))
    .bind(template_id)
    .fetch_all(pool)
    .await
}
