// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{AuthResponse, LoginRequest, RegisterRequest, User},
    utils::{
        extract::AppJson,
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

const USER_COLUMNS: &str = "id, username, email, password, first_name, last_name, is_staff, is_active, date_joined, last_login";

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it and creates the empty
/// profile in the same transaction.
/// Returns 201 Created with a fresh token.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username taken")
    ),
    tag = "auth"
)]
pub async fn register(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.password != payload.password_confirm {
        return Err(AppError::BadRequest("Passwords don't match".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, email, password, first_name, last_name, date_joined)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&hashed_password)
    .bind(payload.first_name.as_deref().unwrap_or_default())
    .bind(payload.last_name.as_deref().unwrap_or_default())
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    sqlx::query("INSERT INTO user_profiles (user_id, date_joined) VALUES (?, ?)")
        .bind(user.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let token = sign_jwt(user.id, user.is_staff, &config.jwt_secret, config.jwt_expiration)?;
    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            username: user.username,
            email: user.email,
            token,
            is_staff: user.is_staff,
        }),
    ))
}

/// Authenticates a user by username or email and returns a JWT token.
///
/// Unknown accounts, wrong passwords and deactivated accounts all answer 400.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (column, identifier) = match (payload.username.as_deref(), payload.email.as_deref()) {
        (Some(username), _) if !username.is_empty() => ("username", username),
        (_, Some(email)) if !email.is_empty() => ("email", email),
        _ => {
            return Err(AppError::BadRequest(
                "Must provide username or email".to_string(),
            ));
        }
    };

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {column} = ? ORDER BY id LIMIT 1"
    ))
    .bind(identifier)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::from(e)
    })?
    .ok_or_else(|| AppError::BadRequest("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::BadRequest("Invalid credentials".to_string()));
    }

    if !user.is_active {
        return Err(AppError::BadRequest("User account is disabled".to_string()));
    }

    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&pool)
        .await?;

    let token = sign_jwt(user.id, user.is_staff, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        username: user.username,
        email: user.email,
        token,
        is_staff: user.is_staff,
    }))
}

/// Revokes the presented token. Later requests carrying it get 401.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Token revoked"),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    sqlx::query(
        r#"
        INSERT INTO revoked_tokens (jti, user_id, revoked_at)
        VALUES (?, ?, ?)
        ON CONFLICT(jti) DO NOTHING
        "#,
    )
    .bind(&claims.jti)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&pool)
    .await?;

    Ok(Json(json!({ "message": "Successfully logged out" })))
}
