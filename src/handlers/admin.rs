// src/handlers/admin.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::{
    error::AppError,
    handlers::test_session::{SESSION_SELECT, fetch_session, fetch_session_answers},
    models::{
        analytics::{
            AdminAnalyticsResponse, AnalyticsParams, DifficultQuestion, DifficultQuestionRow,
            RecentActivity,
        },
        test_session::{
            AdminSessionDetail, AdminSessionParams, SessionDetail, SessionStatus, SessionSummary,
            TestSession, UserHistoryParams, UserHistoryResponse,
        },
        user::{ProfileResponse, User, UserActivityParams, UserInfo, UserProfile},
    },
    utils::{
        extract::AppQuery,
        format::{percentage, preview, round1},
        pagination::Paginated,
    },
};

const DEFAULT_ANALYTICS_DAYS: i64 = 30;

const USER_SELECT: &str = r#"
    SELECT id, username, email, password, first_name, last_name,
           is_staff, is_active, date_joined, last_login
    FROM users
"#;

fn push_session_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    status: Option<SessionStatus>,
    user: Option<i64>,
) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = status {
        builder.push(" AND s.status = ");
        builder.push_bind(status);
    }
    if let Some(user) = user {
        builder.push(" AND s.user_id = ");
        builder.push_bind(user);
    }
}

/// Admin: List test sessions across users, newest first.
///
/// Filters: `status`, `user` (user id). Paginated with `page` / `limit`.
#[utoipa::path(
    get,
    path = "/api/admin/test-sessions",
    params(
        ("page" = Option<i64>, Query, description = "Page number (default 1)"),
        ("limit" = Option<i64>, Query, description = "Results per page (default 20, max 100)"),
        ("status" = Option<SessionStatus>, Query, description = "Session status"),
        ("user" = Option<i64>, Query, description = "Owner's user id")
    ),
    responses(
        (status = 200, description = "Paginated sessions with answers"),
        (status = 400, description = "Invalid pagination, status or user parameter"),
        (status = 403, description = "Not staff")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn list_test_sessions(
    State(pool): State<SqlitePool>,
    AppQuery(params): AppQuery<AdminSessionParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.paging.resolve()?;

    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<SessionStatus>()
                .map_err(|_| AppError::BadRequest("Invalid status parameter".to_string()))?,
        ),
    };
    let user = match params.user.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| AppError::BadRequest("Invalid user_id parameter".to_string()))?,
        ),
    };

    let mut conn = pool.acquire().await?;

    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM test_sessions s");
    push_session_filters(&mut count_query, status, user);
    let total: i64 = count_query
        .build_query_scalar()
        .fetch_one(&mut *conn)
        .await?;

    let mut list_query = QueryBuilder::<Sqlite>::new(SESSION_SELECT);
    push_session_filters(&mut list_query, status, user);
    list_query.push(" ORDER BY s.time_started DESC, s.id DESC LIMIT ");
    list_query.push_bind(page.limit);
    list_query.push(" OFFSET ");
    list_query.push_bind(page.offset());

    let sessions: Vec<TestSession> = list_query
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list test sessions: {:?}", e);
            AppError::from(e)
        })?;

    let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
    let mut answers = fetch_session_answers(&mut conn, &ids).await?;

    let results: Vec<AdminSessionDetail> = sessions
        .iter()
        .map(|session| {
            let rows = answers.remove(&session.id).unwrap_or_default();
            AdminSessionDetail {
                detail: SessionDetail::new(session, &rows),
                user_email: session.user_email.clone(),
            }
        })
        .collect();

    Ok(Json(page.wrap(total, results)))
}

/// Admin: Abandon a session that is still in progress.
#[utoipa::path(
    post,
    path = "/api/admin/test-sessions/{id}/abandon",
    params(("id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session abandoned", body = SessionSummary),
        (status = 400, description = "Session is not in progress"),
        (status = 404, description = "Session not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn abandon_session(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let session = fetch_session(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test session not found".to_string()))?;

    let not_in_progress = || {
        AppError::BadRequest(format!(
            "Cannot abandon a {} test session",
            session.status.as_str()
        ))
    };

    if !session.status.can_transition_to(SessionStatus::Abandoned) {
        return Err(not_in_progress());
    }

    let updated = sqlx::query(
        "UPDATE test_sessions SET status = ?, time_completed = ? WHERE id = ? AND status = ?",
    )
    .bind(SessionStatus::Abandoned)
    .bind(Utc::now())
    .bind(id)
    .bind(SessionStatus::InProgress)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(not_in_progress());
    }

    let abandoned = fetch_session(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Test session not found".to_string()))?;
    tx.commit().await?;

    tracing::info!(session_id = id, "Test session abandoned");

    Ok(Json(SessionSummary::from(&abandoned)))
}

async fn fetch_users(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<HashMap<i64, User>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(USER_SELECT);
    builder.push(" WHERE id IN (");
    let mut separated = builder.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let users: Vec<User> = builder.build_query_as().fetch_all(&mut *conn).await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

/// Admin: List user profiles, most recently joined first.
///
/// Each listed profile is recomputed before it is returned.
#[utoipa::path(
    get,
    path = "/api/admin/user-activities",
    params(
        ("page" = Option<i64>, Query, description = "Page number (default 1)"),
        ("limit" = Option<i64>, Query, description = "Results per page (default 20, max 100)"),
        ("active_only" = Option<bool>, Query, description = "Only active accounts")
    ),
    responses(
        (status = 200, description = "Paginated user profiles"),
        (status = 400, description = "Invalid pagination parameters"),
        (status = 403, description = "Not staff")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn user_activities(
    State(pool): State<SqlitePool>,
    AppQuery(params): AppQuery<UserActivityParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.paging.resolve()?;
    let active_only = params.active_only();

    let mut conn = pool.acquire().await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM user_profiles p
        JOIN users u ON u.id = p.user_id
        WHERE (? = FALSE OR u.is_active = TRUE)
        "#,
    )
    .bind(active_only)
    .fetch_one(&mut *conn)
    .await?;

    let user_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT p.user_id
        FROM user_profiles p
        JOIN users u ON u.id = p.user_id
        WHERE (? = FALSE OR u.is_active = TRUE)
        ORDER BY u.date_joined DESC, u.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(active_only)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;

    let users = fetch_users(&mut conn, &user_ids).await?;

    let mut results = Vec::with_capacity(user_ids.len());
    for user_id in &user_ids {
        let Some(user) = users.get(user_id) else {
            continue;
        };
        // A failed refresh only drops that user from the page.
        match UserProfile::refresh(&mut conn, *user_id).await {
            Ok(profile) => results.push(ProfileResponse::new(user, &profile)),
            Err(e) => tracing::warn!(user_id, "Failed to refresh profile: {:?}", e),
        }
    }

    Ok(Json(page.wrap(total, results)))
}

/// Admin: Completed sessions of one user, newest first.
///
/// `user_id` is required (400 when missing or not an integer, 404 for an unknown user).
#[utoipa::path(
    get,
    path = "/api/admin/user-test-history",
    params(
        ("user_id" = i64, Query, description = "User id"),
        ("page" = Option<i64>, Query, description = "Page number (default 1)"),
        ("limit" = Option<i64>, Query, description = "Results per page (default 20, max 100)")
    ),
    responses(
        (status = 200, description = "User info and paginated completed sessions"),
        (status = 400, description = "Missing or invalid user_id"),
        (status = 404, description = "User not found")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn user_test_history(
    State(pool): State<SqlitePool>,
    AppQuery(params): AppQuery<UserHistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let raw = params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id parameter is required".to_string()))?;
    let user_id: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest("user_id must be a valid integer".to_string()))?;

    let mut conn = pool.acquire().await?;

    let user = fetch_users(&mut conn, &[user_id])
        .await?
        .remove(&user_id)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let page = params.paging.resolve()?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM test_sessions WHERE user_id = ? AND status = ?",
    )
    .bind(user_id)
    .bind(SessionStatus::Completed)
    .fetch_one(&mut *conn)
    .await?;

    let sessions = sqlx::query_as::<_, TestSession>(&format!(
        "{SESSION_SELECT} WHERE s.user_id = ? AND s.status = ? ORDER BY s.time_started DESC, s.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(SessionStatus::Completed)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&mut *conn)
    .await?;

    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
    let sessions: Paginated<SessionSummary> = page.wrap(total, summaries);

    Ok(Json(UserHistoryResponse {
        user_info: UserInfo::from(&user),
        sessions,
    }))
}

/// `days` query value: default 30, values below 1 fall back to 30.
fn resolve_days(raw: Option<&str>) -> Result<i64, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_ANALYTICS_DAYS),
        Some(value) => {
            let days: i64 = value
                .parse()
                .map_err(|_| AppError::BadRequest("Invalid days parameter".to_string()))?;
            Ok(if days < 1 { DEFAULT_ANALYTICS_DAYS } else { days })
        }
    }
}

#[derive(FromRow)]
struct ScoreStats {
    total: i64,
    average: Option<f64>,
    passed: Option<i64>,
}

async fn compute_analytics(
    pool: &SqlitePool,
    days: i64,
) -> Result<AdminAnalyticsResponse, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let now = Utc::now();
    let since = now - Duration::days(days);

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *conn)
        .await?;

    let active_users: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE is_active = TRUE AND last_login >= ?",
    )
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;

    let scores = sqlx::query_as::<_, ScoreStats>(
        r#"
        SELECT
            COUNT(*) AS total,
            AVG(score) AS average,
            SUM(CASE WHEN passed THEN 1 ELSE 0 END) AS passed
        FROM test_sessions
        WHERE status = ?
        "#,
    )
    .bind(SessionStatus::Completed)
    .fetch_one(&mut *conn)
    .await?;

    let recent_tests: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM test_sessions WHERE status = ? AND time_started >= ?",
    )
    .bind(SessionStatus::Completed)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;

    let hardest = sqlx::query_as::<_, DifficultQuestionRow>(
        r#"
        SELECT a.question_id, q.question_text, a.total_attempts, a.correct_attempts
        FROM question_analytics a
        JOIN questions q ON q.id = a.question_id
        WHERE a.total_attempts > 0
        ORDER BY CAST(a.correct_attempts AS REAL) / a.total_attempts ASC, a.question_id ASC
        LIMIT 5
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let new_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE date_joined >= ?")
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;

    let active_questions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_active = TRUE")
            .fetch_one(&mut *conn)
            .await?;

    let total_questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&mut *conn)
        .await?;

    Ok(AdminAnalyticsResponse {
        period_days: days,
        total_users,
        active_users,
        total_tests: scores.total,
        recent_tests,
        average_score: round1(scores.average.unwrap_or(0.0)),
        pass_rate: percentage(scores.passed.unwrap_or(0), scores.total),
        most_difficult_questions: hardest
            .into_iter()
            .map(|row| DifficultQuestion {
                question_id: row.question_id,
                question_text: preview(&row.question_text, 50),
                success_rate: percentage(row.correct_attempts, row.total_attempts),
                total_attempts: row.total_attempts,
                correct_attempts: row.correct_attempts,
            })
            .collect(),
        recent_activity: RecentActivity {
            new_users_this_period: new_users,
            tests_this_period: recent_tests,
            active_questions,
            total_questions,
        },
        generated_at: now,
    })
}

/// Admin: Global analytics over the last `days` days (default 30).
///
/// Aggregation failures answer 500 with zeroed `fallback_data`.
#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    params(AnalyticsParams),
    responses(
        (status = 200, description = "Application analytics", body = AdminAnalyticsResponse),
        (status = 400, description = "Invalid days parameter"),
        (status = 500, description = "Aggregation failed; zeroed fallback_data included")
    ),
    security(("jwt" = [])),
    tag = "admin"
)]
pub async fn analytics(
    State(pool): State<SqlitePool>,
    AppQuery(params): AppQuery<AnalyticsParams>,
) -> Result<Response, AppError> {
    let days = resolve_days(params.days.as_deref())?;

    match compute_analytics(&pool, days).await {
        Ok(report) => Ok(Json(report).into_response()),
        Err(e) => {
            tracing::error!("Failed to compute analytics: {:?}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Server error while generating analytics",
                    "fallback_data": AdminAnalyticsResponse::fallback(),
                })),
            )
                .into_response())
        }
    }
}
