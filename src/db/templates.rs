use sqlx::PgPool;

use super::Template;
use crate::placement::Placement;

pub struct NewTemplate<'a> {
    pub original_name: &'a str,
    pub stored_name: &'a str,
    pub mime_type: &'a str,
    pub file_size: i64,
    pub stored_path: &'a str,
}

/// Inserts an uploaded template. Placement columns start empty, apart from
/// the alignment column default.
pub async fn insert_template(pool: &PgPool, new: &NewTemplate<'_>) -> Result<Template, sqlx::Error> {
    sqlx::query_as::<_, Template>(
        r#"
        INSERT INTO templates (original_name, stored_name, mime_type, file_size, stored_path)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(new.original_name)
    .bind(new.stored_name)
    .bind(new.mime_type)
    .bind(new.file_size)
    .bind(new.stored_path)
    .fetch_one(pool)
    .await
}

pub async fn list_templates(pool: &PgPool) -> Result<Vec<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>("SELECT * FROM templates ORDER BY uploaded_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

pub async fn get_template(pool: &PgPool, template_id: i64) -> Result<Option<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
        .bind(template_id)
        .fetch_optional(pool)
        .await
}

/// Deletes the row; certificates go with it. `false` when it did not exist.
pub async fn delete_template(pool: &PgPool, template_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM templates WHERE id = $1")
        .bind(template_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Writes every placement column in one statement and returns the row as
/// stored. `None` when the template does not exist.
pub async fn save_placement(
    pool: &PgPool,
    template_id: i64,
    placement: &Placement,
) -> Result<Option<Template>, sqlx::Error> {
    sqlx::query_as::<_, Template>(
        r#"
        UPDATE templates
        SET text_x_ratio = $1, text_y_ratio = $2,
            text_x_pixels = $3, text_y_pixels = $4,
            canvas_width = $5, canvas_height = $6,
            text_font_size = $7, text_align = $8, text_color_hex = $9
        WHERE id = $10
        RETURNING *
        "#,
    )
    .bind(placement.ratio_x)
    .bind(placement.ratio_y)
    .bind(placement.pixel_x)
    .bind(placement.pixel_y)
    .bind(placement.surface_width)
    .bind(placement.surface_height)
    .bind(placement.font_size.map(|size| size as i32))
    .bind(placement.alignment.map(|a| a.as_str()))
    .bind(placement.text_color.map(|c| c.to_hex()))
    .bind(template_id)
    .fetch_optional(pool)
    .await
}
