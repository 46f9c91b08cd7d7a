// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, normalize_path::NormalizePath, trace::TraceLayer};

use crate::{
    docs,
    handlers::{admin, auth, category, question, test_session, user},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// The served application: [`create_router`] with trailing slashes trimmed
/// before routing, so `/api/test/start/` and `/api/test/start` are the same route.
pub fn create_app(state: AppState) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(create_router(state))
}

/// Assembles the main application router.
///
/// * Everything lives under `/api`; the OpenAPI document is at `/api-docs/openapi.json`.
/// * `auth` layers run before `staff` layers on admin routes.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/logout", post(auth::logout))
                .layer(require_auth.clone()),
        );

    let test_routes = Router::new()
        .route(
            "/start",
            get(test_session::start_test).post(test_session::start_test),
        )
        .route("/submit", post(test_session::submit_test))
        .route("/history", get(test_session::test_history))
        .layer(require_auth.clone());

    let user_routes = Router::new()
        .route("/stats", get(user::user_stats))
        .route("/profile", get(user::user_profile))
        .layer(require_auth.clone());

    let question_routes = Router::new()
        .route("/", get(question::list_questions))
        .route("/{id}", get(question::question_detail))
        .route("/{id}/analytics", get(question::question_analytics))
        .layer(require_auth.clone());

    let category_routes = Router::new().route("/", get(category::list_categories));

    let admin_routes = Router::new()
        .route("/test-sessions", get(admin::list_test_sessions))
        .route("/test-sessions/{id}/abandon", post(admin::abandon_session))
        .route("/user-activities", get(admin::user_activities))
        .route("/user-test-history", get(admin::user_test_history))
        .route("/analytics", get(admin::analytics))
        .route("/categories", post(category::create_category))
        .route(
            "/categories/{id}",
            put(category::update_category).delete(category::delete_category),
        )
        .route("/questions", post(question::create_question))
        .route(
            "/questions/{id}",
            put(question::update_question).delete(question::delete_question),
        )
        // Double middleware protection: Auth first, then Staff check
        .layer(middleware::from_fn(staff_middleware))
        .layer(require_auth);

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/test", test_routes)
        .nest("/user", user_routes)
        .nest("/questions", question_routes)
        .nest("/categories", category_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api)
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
