// src/models/analytics.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, SqliteConnection};
use utoipa::{IntoParams, ToSchema};

use crate::utils::format::percentage;

/// Represents the 'question_analytics' table: attempt counters per question.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionAnalytics {
    pub question_id: i64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
}

impl QuestionAnalytics {
    pub fn success_rate(&self) -> f64 {
        percentage(self.correct_attempts, self.total_attempts)
    }

    /// Recounts every recorded answer for the question and stores the totals.
    pub async fn refresh(
        conn: &mut SqliteConnection,
        question_id: i64,
    ) -> Result<QuestionAnalytics, sqlx::Error> {
        sqlx::query_as::<_, QuestionAnalytics>(
            r#"
            INSERT INTO question_analytics (question_id, total_attempts, correct_attempts)
            SELECT
                ?1,
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_correct THEN 1 ELSE 0 END), 0)
            FROM test_answers
            WHERE question_id = ?1
            ON CONFLICT(question_id) DO UPDATE SET
                total_attempts = excluded.total_attempts,
                correct_attempts = excluded.correct_attempts
            RETURNING question_id, total_attempts, correct_attempts
            "#,
        )
        .bind(question_id)
        .fetch_one(&mut *conn)
        .await
    }
}

/// A recent answer to a question, as shown in question analytics.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecentAnswer {
    pub username: String,
    pub is_correct: bool,
    pub points_earned: i64,
    /// `YYYY-MM-DD HH:MM`
    pub answered_at: String,
}

#[derive(Debug, FromRow)]
pub struct RecentAnswerRow {
    pub username: String,
    pub is_correct: bool,
    pub points_earned: i64,
    pub answered_at: DateTime<Utc>,
}

impl From<RecentAnswerRow> for RecentAnswer {
    fn from(row: RecentAnswerRow) -> Self {
        Self {
            username: row.username,
            is_correct: row.is_correct,
            points_earned: row.points_earned,
            answered_at: row.answered_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionAnalyticsResponse {
    pub question_id: i64,
    pub question_text: String,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub success_rate: f64,
    pub recent_users: Vec<RecentAnswer>,
}

/// Query parameters for the admin analytics endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsParams {
    /// Length of the reporting window in days (default 30).
    pub days: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DifficultQuestion {
    pub question_id: i64,
    pub question_text: String,
    pub success_rate: f64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
}

#[derive(Debug, FromRow)]
pub struct DifficultQuestionRow {
    pub question_id: i64,
    pub question_text: String,
    pub total_attempts: i64,
    pub correct_attempts: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentActivity {
    pub new_users_this_period: i64,
    pub tests_this_period: i64,
    pub active_questions: i64,
    pub total_questions: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminAnalyticsResponse {
    pub period_days: i64,
    pub total_users: i64,
    pub active_users: i64,
    pub total_tests: i64,
    pub recent_tests: i64,
    pub average_score: f64,
    pub pass_rate: f64,
    pub most_difficult_questions: Vec<DifficultQuestion>,
    pub recent_activity: RecentActivity,
    pub generated_at: DateTime<Utc>,
}

impl AdminAnalyticsResponse {
    /// Zeroed figures sent alongside a 500 when aggregation fails.
    pub fn fallback() -> serde_json::Value {
        json!({
            "total_users": 0,
            "total_tests": 0,
            "average_score": 0,
            "pass_rate": 0,
            "most_difficult_questions": [],
        })
    }
}
