// src/models/test_session.rs

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    models::{
        question::{PublicQuestion, ReviewQuestion},
        user::UserInfo,
    },
    utils::{
        format::{format_duration, percentage},
        pagination::{PageParams, Paginated},
    },
};

/// Lifecycle of a test session.
///
/// `InProgress` is the only non-terminal state; nothing leaves `Completed` or `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Abandoned)
        )
    }
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            _ => Err(()),
        }
    }
}

/// A 'test_sessions' row joined with the owner's username and email.
#[derive(Debug, Clone, FromRow)]
pub struct TestSession {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub user_email: String,
    pub status: SessionStatus,
    pub score: Option<i64>,
    pub total_questions: i64,
    pub passed: Option<bool>,
    pub pass_threshold: i64,
    pub time_started: DateTime<Utc>,
    pub time_completed: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
}

impl TestSession {
    pub fn pass_percentage(&self) -> f64 {
        self.score
            .map(|score| percentage(score, self.total_questions))
            .unwrap_or(0.0)
    }
}

/// Lighter session view used in history listings.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: i64,
    pub username: String,
    pub status: SessionStatus,
    pub score: Option<i64>,
    pub total_questions: i64,
    pub passed: Option<bool>,
    pub pass_percentage: f64,
    pub time_started: DateTime<Utc>,
    pub time_completed: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
    pub duration_formatted: Option<String>,
}

impl From<&TestSession> for SessionSummary {
    fn from(session: &TestSession) -> Self {
        Self {
            id: session.id,
            username: session.username.clone(),
            status: session.status,
            score: session.score,
            total_questions: session.total_questions,
            passed: session.passed,
            pass_percentage: session.pass_percentage(),
            time_started: session.time_started,
            time_completed: session.time_completed,
            time_taken_seconds: session.time_taken_seconds,
            duration_formatted: format_duration(session.time_taken_seconds),
        }
    }
}

/// A 'test_answers' row joined with the question and option texts.
#[derive(Debug, Clone, FromRow)]
pub struct TestAnswerRow {
    pub id: i64,
    pub test_session_id: i64,
    pub question_id: i64,
    pub question_text: String,
    pub selected_option_id: Option<i64>,
    pub selected_option_text: Option<String>,
    pub is_correct: bool,
    pub points_earned: i64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestAnswerResponse {
    pub id: i64,
    pub question: i64,
    pub question_text: String,
    pub selected_option: Option<i64>,
    pub selected_option_text: Option<String>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl From<&TestAnswerRow> for TestAnswerResponse {
    fn from(row: &TestAnswerRow) -> Self {
        Self {
            id: row.id,
            question: row.question_id,
            question_text: row.question_text.clone(),
            selected_option: row.selected_option_id,
            selected_option_text: row.selected_option_text.clone(),
            is_correct: row.is_correct,
            answered_at: row.answered_at,
        }
    }
}

/// Session with its recorded answers.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub answers: Vec<TestAnswerResponse>,
}

impl SessionDetail {
    pub fn new(session: &TestSession, answers: &[TestAnswerRow]) -> Self {
        Self {
            summary: SessionSummary::from(session),
            answers: answers.iter().map(TestAnswerResponse::from).collect(),
        }
    }
}

/// Session detail as listed for admins.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSessionDetail {
    #[serde(flatten)]
    pub detail: SessionDetail,
    pub user_email: String,
}

/// Query parameters for the admin session listing.
#[derive(Debug, Default, Deserialize)]
pub struct AdminSessionParams {
    #[serde(flatten)]
    pub paging: PageParams,
    /// `in_progress`, `completed` or `abandoned`.
    pub status: Option<String>,
    /// Owner's user id.
    pub user: Option<String>,
}

/// Query parameters for one user's history, as seen by admins.
#[derive(Debug, Default, Deserialize)]
pub struct UserHistoryParams {
    #[serde(flatten)]
    pub paging: PageParams,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserHistoryResponse {
    pub user_info: UserInfo,
    #[serde(flatten)]
    pub sessions: Paginated<SessionSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartTestResponse {
    pub test_session_id: i64,
    pub questions: Vec<PublicQuestion>,
}

/// One (question, selected option) pair of a submission.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnswerItem {
    pub question_id: i64,
    #[serde(default)]
    pub selected_option_id: Option<i64>,
}

/// DTO for submitting a test session.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitTestRequest {
    pub test_session_id: i64,
    pub answers: Vec<AnswerItem>,
    #[validate(range(min = 0, message = "time_taken_seconds must be a non-negative integer."))]
    pub time_taken_seconds: i64,
}

/// One row of the per-answer breakdown returned after a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerBreakdown {
    pub question_id: i64,
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub points_earned: i64,
    pub answered_by: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DetailedResults {
    pub total_points_earned: i64,
    pub total_possible_points: i64,
    pub percentage: f64,
    pub answers_breakdown: Vec<AnswerBreakdown>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitTestResponse {
    pub test_session: SessionDetail,
    pub questions_review: Vec<ReviewQuestion>,
    /// Question id → selected option id (`null` when left unanswered).
    pub user_answers: BTreeMap<i64, Option<i64>>,
    pub detailed_results: DetailedResults,
}
