// src/handlers/user.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    handlers::test_session::SESSION_SELECT,
    models::{
        test_session::{SessionStatus, SessionSummary, TestSession},
        user::{ProfileResponse, User, UserProfile, UserStatsResponse},
    },
    utils::{
        format::{percentage, round1},
        jwt::Claims,
    },
};

#[derive(FromRow)]
struct StatsRow {
    total: i64,
    passed: Option<i64>,
    average: Option<f64>,
    best: Option<i64>,
}

/// Totals over the caller's completed sessions plus the five most recent ones.
#[utoipa::path(
    get,
    path = "/api/user/stats",
    responses(
        (status = 200, description = "User statistics", body = UserStatsResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "users"
)]
pub async fn user_stats(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let stats = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT
            COUNT(*) AS total,
            SUM(CASE WHEN passed THEN 1 ELSE 0 END) AS passed,
            AVG(score) AS average,
            MAX(score) AS best
        FROM test_sessions
        WHERE user_id = ? AND status = ?
        "#,
    )
    .bind(user_id)
    .bind(SessionStatus::Completed)
    .fetch_one(&pool)
    .await?;

    let recent = sqlx::query_as::<_, TestSession>(&format!(
        "{SESSION_SELECT} WHERE s.user_id = ? AND s.status = ? ORDER BY s.time_started DESC, s.id DESC LIMIT 5"
    ))
    .bind(user_id)
    .bind(SessionStatus::Completed)
    .fetch_all(&pool)
    .await?;

    let passed = stats.passed.unwrap_or(0);

    Ok(Json(UserStatsResponse {
        total_tests: stats.total,
        passed_tests: passed,
        pass_rate: percentage(passed, stats.total),
        average_score: round1(stats.average.unwrap_or(0.0)),
        best_score: stats.best.unwrap_or(0),
        recent_tests: recent.iter().map(SessionSummary::from).collect(),
    }))
}

/// Returns the caller's profile, creating it on first access (201).
#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Existing profile", body = ProfileResponse),
        (status = 201, description = "Profile created", body = ProfileResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "users"
)]
pub async fn user_profile(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut conn = pool.acquire().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, password, first_name, last_name,
               is_staff, is_active, date_joined, last_login
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (profile, created) = UserProfile::get_or_create(&mut conn, user_id).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(ProfileResponse::new(&user, &profile))))
}
