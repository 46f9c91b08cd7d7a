// src/handlers/question.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        analytics::{QuestionAnalytics, QuestionAnalyticsResponse, RecentAnswer, RecentAnswerRow},
        question::{
            AnswerOption, CreateQuestionRequest, OptionInput, QuestionDetail, QuestionListParams,
            QuestionRow, UpdateQuestionRequest,
        },
    },
    utils::{
        extract::{AppJson, AppQuery},
        format::preview,
        html::clean_text,
        jwt::Claims,
    },
};

/// Shared SELECT for `QuestionRow`; callers append WHERE / ORDER BY.
pub(crate) const QUESTION_SELECT: &str = r#"
    SELECT
        q.id, q.question_text, q.category_id, c.name AS category_name,
        q.difficulty, q.image_url, q.explanation, q.is_active,
        u.username AS created_by_username,
        q.created_at, q.updated_at
    FROM questions q
    JOIN question_categories c ON c.id = q.category_id
    LEFT JOIN users u ON u.id = q.created_by
"#;

/// Loads the given questions (active or not), keyed by id.
pub(crate) async fn fetch_questions(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, QuestionRow>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(QUESTION_SELECT);
    builder.push(" WHERE q.id IN (");
    let mut separated = builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().map(|row| (row.id, row)).collect())
}

/// Loads the answer options of the given questions in display order, grouped by question.
pub(crate) async fn fetch_options(
    conn: &mut SqliteConnection,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<AnswerOption>>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, question_id, option_text, is_correct, display_order FROM answer_options WHERE question_id IN (",
    );
    let mut separated = builder.separated(",");
    for id in question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY question_id, display_order, id");

    let options: Vec<AnswerOption> = builder.build_query_as().fetch_all(&mut *conn).await?;

    let mut grouped: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
    for opt in options {
        grouped.entry(opt.question_id).or_default().push(opt);
    }
    Ok(grouped)
}

async fn fetch_active_question(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<QuestionRow, AppError> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "{QUESTION_SELECT} WHERE q.id = ? AND q.is_active = TRUE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
}

/// Lists active questions, newest first.
/// Optional filters: `category` (id), `difficulty`, `search` (substring of the text).
#[utoipa::path(
    get,
    path = "/api/questions",
    params(QuestionListParams),
    responses(
        (status = 200, description = "Active questions", body = Vec<QuestionDetail>),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "questions"
)]
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    AppQuery(params): AppQuery<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let mut builder = QueryBuilder::<Sqlite>::new(QUESTION_SELECT);
    builder.push(" WHERE q.is_active = TRUE");

    if let Some(category) = params.category {
        builder.push(" AND q.category_id = ");
        builder.push_bind(category);
    }

    if let Some(difficulty) = params.difficulty {
        builder.push(" AND q.difficulty = ");
        builder.push_bind(difficulty);
    }

    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        // LIKE is case-insensitive for ASCII in SQLite
        builder.push(" AND q.question_text LIKE '%' || ");
        builder.push_bind(escape_like(search));
        builder.push(" || '%' ESCAPE '\\'");
    }

    builder.push(" ORDER BY q.created_at DESC, q.id DESC");

    let rows: Vec<QuestionRow> = builder
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list questions: {:?}", e);
            AppError::from(e)
        })?;

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut options = fetch_options(&mut conn, &ids).await?;

    let questions: Vec<QuestionDetail> = rows
        .into_iter()
        .map(|row| {
            let opts = options.remove(&row.id).unwrap_or_default();
            QuestionDetail::new(row, &opts)
        })
        .collect();

    Ok(Json(questions))
}

/// Returns one active question with its options and answer key.
#[utoipa::path(
    get,
    path = "/api/questions/{id}",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question detail", body = QuestionDetail),
        (status = 404, description = "Question not found")
    ),
    security(("jwt" = [])),
    tag = "questions"
)]
pub async fn question_detail(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let row = fetch_active_question(&mut conn, id).await?;
    let options = fetch_options(&mut conn, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();

    Ok(Json(QuestionDetail::new(row, &options)))
}

/// Success rate of one question, recomputed from every recorded answer,
/// plus the ten most recent answerers.
#[utoipa::path(
    get,
    path = "/api/questions/{id}/analytics",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question analytics", body = QuestionAnalyticsResponse),
        (status = 404, description = "Question not found")
    ),
    security(("jwt" = [])),
    tag = "questions"
)]
pub async fn question_analytics(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let question = fetch_active_question(&mut conn, id).await?;
    let analytics = QuestionAnalytics::refresh(&mut conn, id).await?;

    let recent: Vec<RecentAnswerRow> = sqlx::query_as(
        r#"
        SELECT u.username, a.is_correct, a.points_earned, a.answered_at
        FROM test_answers a
        JOIN test_sessions s ON s.id = a.test_session_id
        JOIN users u ON u.id = s.user_id
        WHERE a.question_id = ?
        ORDER BY a.answered_at DESC, a.id DESC
        LIMIT 10
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(QuestionAnalyticsResponse {
        question_id: question.id,
        question_text: preview(&question.question_text, 100),
        total_attempts: analytics.total_attempts,
        correct_attempts: analytics.correct_attempts,
        success_rate: analytics.success_rate(),
        recent_users: recent.into_iter().map(RecentAnswer::from).collect(),
    }))
}

async fn ensure_category(conn: &mut SqliteConnection, category_id: i64) -> Result<(), AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM question_categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&mut *conn)
        .await?;

    exists
        .map(|_| ())
        .ok_or_else(|| AppError::BadRequest("Invalid category_id".to_string()))
}

async fn answer_count(conn: &mut SqliteConnection, question_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM test_answers WHERE question_id = ?")
        .bind(question_id)
        .fetch_one(&mut *conn)
        .await
}

/// Inserts the options in the given order; `display_order` starts at 1.
async fn insert_options(
    conn: &mut SqliteConnection,
    question_id: i64,
    options: &[OptionInput],
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO answer_options (question_id, option_text, is_correct, display_order) ",
    );
    builder.push_values(options.iter().enumerate(), |mut b, (i, opt)| {
        b.push_bind(question_id)
            .push_bind(clean_text(&opt.option_text))
            .push_bind(opt.is_correct)
            .push_bind(i as i64 + 1);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

async fn load_detail(conn: &mut SqliteConnection, id: i64) -> Result<QuestionDetail, AppError> {
    let row = fetch_questions(conn, &[id])
        .await?
        .remove(&id)
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
    let options = fetch_options(conn, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();
    Ok(QuestionDetail::new(row, &options))
}

/// Admin: Create a question together with its options.
///
/// Text fields are sanitized. The author is the calling staff user.
#[utoipa::path(
    post,
    path = "/api/admin/questions",
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question created", body = QuestionDetail),
        (status = 400, description = "Validation failed or unknown category")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let author = claims.user_id()?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    ensure_category(&mut tx, payload.category_id).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions
            (question_text, category_id, difficulty, image_url, explanation, is_active, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(clean_text(&payload.question_text))
    .bind(payload.category_id)
    .bind(payload.difficulty)
    .bind(payload.image_url.as_deref().map(str::trim))
    .bind(payload.explanation.as_deref().map(clean_text).unwrap_or_default())
    .bind(payload.is_active.unwrap_or(true))
    .bind(author)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    insert_options(&mut tx, id, &payload.options).await?;
    let detail = load_detail(&mut tx, id).await?;

    tx.commit().await?;

    tracing::info!(question_id = id, created_by = author, "Question created");

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Admin: Update a question (partial update).
///
/// When `options` is present the whole option set is replaced, which is only
/// allowed while nobody has answered the question yet (409 otherwise).
#[utoipa::path(
    put,
    path = "/api/admin/questions/{id}",
    params(("id" = i64, Path, description = "Question id")),
    request_body = UpdateQuestionRequest,
    responses(
        (status = 200, description = "Question updated", body = QuestionDetail),
        (status = 400, description = "Validation failed or unknown category"),
        (status = 404, description = "Question not found"),
        (status = 409, description = "Options of an answered question cannot be replaced")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    if let Some(category_id) = payload.category_id {
        ensure_category(&mut tx, category_id).await?;
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    if let Some(text) = &payload.question_text {
        separated.push("question_text = ");
        separated.push_bind_unseparated(clean_text(text));
    }

    if let Some(category_id) = payload.category_id {
        separated.push("category_id = ");
        separated.push_bind_unseparated(category_id);
    }

    if let Some(difficulty) = payload.difficulty {
        separated.push("difficulty = ");
        separated.push_bind_unseparated(difficulty);
    }

    if let Some(image_url) = &payload.image_url {
        separated.push("image_url = ");
        separated.push_bind_unseparated(image_url.trim().to_string());
    }

    if let Some(explanation) = &payload.explanation {
        separated.push("explanation = ");
        separated.push_bind_unseparated(clean_text(explanation));
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&mut *tx).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::from(e)
    })?;

    if let Some(options) = &payload.options {
        if answer_count(&mut tx, id).await? > 0 {
            return Err(AppError::Conflict(
                "Options cannot be replaced once the question has been answered".to_string(),
            ));
        }

        sqlx::query("DELETE FROM answer_options WHERE question_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_options(&mut tx, id, options).await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(Json(detail))
}

/// Admin: Delete a question that has never been answered.
///
/// Answered questions answer 409; deactivate them with an update instead.
#[utoipa::path(
    delete,
    path = "/api/admin/questions/{id}",
    params(("id" = i64, Path, description = "Question id")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "Question not found"),
        (status = 409, description = "Question has recorded answers")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    if answer_count(&mut tx, id).await? > 0 {
        return Err(AppError::Conflict(
            "Question has recorded answers; deactivate it instead".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Escapes `LIKE` wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
