// src/models/user.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    models::test_session::SessionSummary,
    utils::{format::percentage, pagination::PageParams},
};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub first_name: String,
    pub last_name: String,

    /// Staff users may call the admin endpoints.
    pub is_staff: bool,

    /// Deactivated users cannot log in and their tokens stop working.
    pub is_active: bool,

    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(
        length(
            min = 3,
            max = 150,
            message = "Username length must be between 3 and 150 characters."
        ),
        custom(function = validate_username)
    )]
    pub username: String,

    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,

    pub password_confirm: String,

    #[validate(length(max = 150))]
    pub first_name: Option<String>,

    #[validate(length(max = 150))]
    pub last_name: Option<String>,
}

fn validate_username(username: &str) -> Result<(), validator::ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(validator::ValidationError::new("invalid_username")
            .with_message("Username may contain only letters, digits and @/./+/-/_".into()));
    }
    Ok(())
}

/// DTO for user login. Either `username` or `email` identifies the account.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Returned by register and login.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub token: String,
    pub is_staff: bool,
}

/// Represents the 'user_profiles' table: counters derived from completed sessions.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub date_joined: DateTime<Utc>,
    pub total_tests_taken: i64,
    pub total_tests_passed: i64,
    pub best_score: i64,
}

#[derive(FromRow)]
struct ProfileCounters {
    taken: i64,
    passed: Option<i64>,
    best: Option<i64>,
}

impl UserProfile {
    pub fn pass_rate(&self) -> f64 {
        percentage(self.total_tests_passed, self.total_tests_taken)
    }

    /// Loads the profile, creating an empty one first if the user has none.
    /// The flag is `true` when a row was created.
    pub async fn get_or_create(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<(UserProfile, bool), sqlx::Error> {
        let created = sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, date_joined)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .rows_affected()
            > 0;

        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, date_joined, total_tests_taken, total_tests_passed, best_score
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok((profile, created))
    }

    /// Recomputes the counters from the user's completed sessions.
    pub async fn refresh(
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<UserProfile, sqlx::Error> {
        let counters = sqlx::query_as::<_, ProfileCounters>(
            r#"
            SELECT
                COUNT(*) AS taken,
                SUM(CASE WHEN passed THEN 1 ELSE 0 END) AS passed,
                MAX(score) AS best
            FROM test_sessions
            WHERE user_id = ? AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, date_joined, total_tests_taken, total_tests_passed, best_score)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                total_tests_taken = excluded.total_tests_taken,
                total_tests_passed = excluded.total_tests_passed,
                best_score = excluded.best_score
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .bind(counters.taken)
        .bind(counters.passed.unwrap_or(0))
        .bind(counters.best.unwrap_or(0))
        .execute(&mut *conn)
        .await?;

        let (profile, _) = Self::get_or_create(conn, user_id).await?;
        Ok(profile)
    }
}

/// Profile plus the owning user's public fields.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
    pub total_tests_taken: i64,
    pub total_tests_passed: i64,
    pub best_score: i64,
    pub pass_rate: f64,
}

impl ProfileResponse {
    pub fn new(user: &User, profile: &UserProfile) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            date_joined: profile.date_joined,
            total_tests_taken: profile.total_tests_taken,
            total_tests_passed: profile.total_tests_passed,
            best_score: profile.best_score,
            pass_rate: profile.pass_rate(),
        }
    }
}

/// Query parameters for the admin user activity listing.
#[derive(Debug, Default, Deserialize)]
pub struct UserActivityParams {
    #[serde(flatten)]
    pub paging: PageParams,
    /// `true` (any case) keeps active accounts only.
    pub active_only: Option<String>,
}

impl UserActivityParams {
    pub fn active_only(&self) -> bool {
        self.active_only
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Aggregates over the caller's completed sessions.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserStatsResponse {
    pub total_tests: i64,
    pub passed_tests: i64,
    pub pass_rate: f64,
    pub average_score: f64,
    pub best_score: i64,
    /// Up to five most recent completed sessions.
    pub recent_tests: Vec<SessionSummary>,
}

/// Account summary shown to admins above a user's test history.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            date_joined: user.date_joined,
        }
    }
}
