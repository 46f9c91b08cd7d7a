// src/docs.rs

use axum::Json;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{handlers, models};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Driving Test API",
        description = "Practice sessions, scoring and analytics for the theory driving test."
    ),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::test_session::start_test,
        handlers::test_session::submit_test,
        handlers::test_session::test_history,
        handlers::user::user_stats,
        handlers::user::user_profile,
        handlers::question::list_questions,
        handlers::question::question_detail,
        handlers::question::question_analytics,
        handlers::question::create_question,
        handlers::question::update_question,
        handlers::question::delete_question,
        handlers::category::list_categories,
        handlers::category::create_category,
        handlers::category::update_category,
        handlers::category::delete_category,
        handlers::admin::list_test_sessions,
        handlers::admin::abandon_session,
        handlers::admin::user_activities,
        handlers::admin::user_test_history,
        handlers::admin::analytics,
    ),
    components(schemas(
        models::user::RegisterRequest,
        models::user::LoginRequest,
        models::user::AuthResponse,
        models::user::ProfileResponse,
        models::user::UserStatsResponse,
        models::user::UserInfo,
        models::category::CategoryResponse,
        models::category::CreateCategoryRequest,
        models::category::UpdateCategoryRequest,
        models::question::Difficulty,
        models::question::PublicOption,
        models::question::OptionWithAnswer,
        models::question::PublicQuestion,
        models::question::ReviewQuestion,
        models::question::QuestionDetail,
        models::question::OptionInput,
        models::question::CreateQuestionRequest,
        models::question::UpdateQuestionRequest,
        models::test_session::SessionStatus,
        models::test_session::SessionSummary,
        models::test_session::TestAnswerResponse,
        models::test_session::SessionDetail,
        models::test_session::AdminSessionDetail,
        models::test_session::StartTestResponse,
        models::test_session::AnswerItem,
        models::test_session::SubmitTestRequest,
        models::test_session::AnswerBreakdown,
        models::test_session::DetailedResults,
        models::test_session::SubmitTestResponse,
        models::analytics::RecentAnswer,
        models::analytics::QuestionAnalyticsResponse,
        models::analytics::DifficultQuestion,
        models::analytics::RecentActivity,
        models::analytics::AdminAnalyticsResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration and tokens"),
        (name = "tests", description = "Taking and scoring test sessions"),
        (name = "users", description = "The caller's profile and statistics"),
        (name = "questions", description = "Question bank"),
        (name = "categories", description = "Question categories"),
        (name = "admin", description = "Staff-only reporting and content management")
    )
)]
pub struct ApiDoc;

/// Registers the `jwt` bearer scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
