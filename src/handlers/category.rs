// src/handlers/category.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::category::{CategoryResponse, CreateCategoryRequest, UpdateCategoryRequest},
    utils::{extract::AppJson, format::title_case, html::clean_text},
};

const CATEGORY_SELECT: &str = r#"
    SELECT
        c.id, c.name, c.description,
        (SELECT COUNT(*) FROM questions q WHERE q.category_id = c.id AND q.is_active = TRUE) AS question_count,
        c.created_at
    FROM question_categories c
"#;

/// Trimmed, sanitized and title-cased; blank names are rejected.
fn normalize_name(raw: &str) -> Result<String, AppError> {
    let name = title_case(&clean_text(raw));
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name cannot be blank".to_string()));
    }
    Ok(name)
}

async fn fetch_category(conn: &mut SqliteConnection, id: i64) -> Result<CategoryResponse, AppError> {
    sqlx::query_as::<_, CategoryResponse>(&format!("{CATEGORY_SELECT} WHERE c.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
}

fn conflict_or_internal(name: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Category '{}' already exists", name))
        } else {
            tracing::error!("Failed to write category: {:?}", e);
            AppError::from(e)
        }
    }
}

/// Lists all categories by name with their active question counts.
#[utoipa::path(
    get,
    path = "/api/categories",
    responses((status = 200, description = "Categories", body = Vec<CategoryResponse>)),
    tag = "categories"
)]
pub async fn list_categories(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let categories =
        sqlx::query_as::<_, CategoryResponse>(&format!("{CATEGORY_SELECT} ORDER BY c.name"))
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list categories: {:?}", e);
                AppError::from(e)
            })?;

    Ok(Json(categories))
}

/// Admin: Create a category.
#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Name already used")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn create_category(
    State(pool): State<SqlitePool>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let name = normalize_name(&payload.name)?;
    let description = payload.description.as_deref().map(clean_text).unwrap_or_default();

    let mut conn = pool.acquire().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO question_categories (name, description, created_at)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(conflict_or_internal(&name))?;

    tracing::info!(category_id = id, "Category created");

    let category = fetch_category(&mut conn, id).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// Admin: Update a category (partial update).
#[utoipa::path(
    put,
    path = "/api/admin/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Name already used")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn update_category(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut conn = pool.acquire().await?;

    let name = payload.name.as_deref().map(normalize_name).transpose()?;
    let description = payload.description.as_deref().map(clean_text);

    if name.is_none() && description.is_none() {
        return Ok(Json(fetch_category(&mut conn, id).await?));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE question_categories SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = &name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.clone());
    }

    if let Some(description) = description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(conflict_or_internal(name.as_deref().unwrap_or_default()))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    Ok(Json(fetch_category(&mut conn, id).await?))
}

/// Admin: Delete an empty category.
///
/// Categories that still hold questions answer 409, so no recorded answer loses its question.
#[utoipa::path(
    delete,
    path = "/api/admin/categories/{id}",
    params(("id" = i64, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Category still has questions")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn delete_category(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE category_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    if questions > 0 {
        return Err(AppError::Conflict(
            "Category still has questions".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM question_categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}
