// src/handlers/test_session.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    config::{PASS_THRESHOLD, TEST_QUESTION_COUNT},
    error::AppError,
    handlers::question::{fetch_options, fetch_questions},
    models::{
        analytics::QuestionAnalytics,
        question::{AnswerOption, PublicQuestion, QuestionRow, ReviewQuestion},
        test_session::{
            AnswerBreakdown, AnswerItem, DetailedResults, SessionDetail, SessionStatus,
            SessionSummary, StartTestResponse, SubmitTestRequest, SubmitTestResponse,
            TestAnswerRow, TestSession,
        },
        user::UserProfile,
    },
    utils::{
        extract::AppJson,
        format::{percentage, preview},
        jwt::Claims,
    },
};

/// Shared SELECT for `TestSession`; callers append WHERE / ORDER BY.
pub(crate) const SESSION_SELECT: &str = r#"
    SELECT
        s.id, s.user_id, u.username, u.email AS user_email,
        s.status, s.score, s.total_questions, s.passed, s.pass_threshold,
        s.time_started, s.time_completed, s.time_taken_seconds
    FROM test_sessions s
    JOIN users u ON u.id = s.user_id
"#;

/// Option facts needed to grade an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionKey {
    pub question_id: i64,
    pub is_correct: bool,
}

/// Outcome of grading one submitted pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAnswer {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub is_correct: bool,
    pub points_earned: i64,
}

/// Grades submitted pairs against the known questions and options.
///
/// A pair is dropped when its question is unknown, when the selected option
/// does not exist or belongs to another question, or when the question was
/// already graded earlier in the same submission. A pair without a selected
/// option is kept as unanswered with zero points.
pub fn grade_answers(
    items: &[AnswerItem],
    known_questions: &HashSet<i64>,
    options: &HashMap<i64, OptionKey>,
) -> Vec<GradedAnswer> {
    let mut seen = HashSet::new();
    let mut graded = Vec::with_capacity(items.len());

    for item in items {
        if !known_questions.contains(&item.question_id) || seen.contains(&item.question_id) {
            continue;
        }

        let (is_correct, selected) = match item.selected_option_id {
            None => (false, None),
            Some(option_id) => match options.get(&option_id) {
                Some(key) if key.question_id == item.question_id => (key.is_correct, Some(option_id)),
                _ => continue,
            },
        };

        seen.insert(item.question_id);
        graded.push(GradedAnswer {
            question_id: item.question_id,
            selected_option_id: selected,
            is_correct,
            points_earned: if is_correct { 1 } else { 0 },
        });
    }

    graded
}

/// Sum of points over the graded answers.
pub fn total_score(graded: &[GradedAnswer]) -> i64 {
    graded.iter().map(|answer| answer.points_earned).sum()
}

pub fn is_passing(score: i64, threshold: i64) -> bool {
    score >= threshold
}

pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<TestSession>, sqlx::Error> {
    sqlx::query_as::<_, TestSession>(&format!("{SESSION_SELECT} WHERE s.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Loads the recorded answers of the given sessions, grouped by session.
pub(crate) async fn fetch_session_answers(
    conn: &mut SqliteConnection,
    session_ids: &[i64],
) -> Result<HashMap<i64, Vec<TestAnswerRow>>, sqlx::Error> {
    if session_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT
            a.id, a.test_session_id, a.question_id, q.question_text,
            a.selected_option_id, o.option_text AS selected_option_text,
            a.is_correct, a.points_earned, a.answered_at
        FROM test_answers a
        JOIN questions q ON q.id = a.question_id
        LEFT JOIN answer_options o ON o.id = a.selected_option_id
        WHERE a.test_session_id IN (
        "#,
    );
    let mut separated = builder.separated(",");
    for id in session_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY a.id");

    let rows: Vec<TestAnswerRow> = builder.build_query_as().fetch_all(&mut *conn).await?;

    let mut grouped: HashMap<i64, Vec<TestAnswerRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.test_session_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Starts a new test session with 20 random active questions.
///
/// Options are sent without their correctness flag.
#[utoipa::path(
    get,
    path = "/api/test/start",
    responses(
        (status = 200, description = "Session created", body = StartTestResponse),
        (status = 400, description = "Not enough questions available"),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "tests"
)]
pub async fn start_test(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let mut tx = pool.begin().await?;

    let question_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM questions
        WHERE is_active = TRUE
        ORDER BY RANDOM()
        LIMIT ?
        "#,
    )
    .bind(TEST_QUESTION_COUNT)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to sample questions: {:?}", e);
        AppError::from(e)
    })?;

    if (question_ids.len() as i64) < TEST_QUESTION_COUNT {
        return Err(AppError::BadRequest("Not enough questions available".to_string()));
    }

    let session_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO test_sessions (user_id, status, total_questions, pass_threshold, time_started)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(SessionStatus::InProgress)
    .bind(TEST_QUESTION_COUNT)
    .bind(PASS_THRESHOLD)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    let mut builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO test_session_questions (test_session_id, question_id) ",
    );
    builder.push_values(&question_ids, |mut b, question_id| {
        b.push_bind(session_id).push_bind(*question_id);
    });
    builder.build().execute(&mut *tx).await?;

    let questions = fetch_questions(&mut tx, &question_ids).await?;
    let options = fetch_options(&mut tx, &question_ids).await?;

    tx.commit().await?;

    let public: Vec<PublicQuestion> = question_ids
        .iter()
        .filter_map(|id| questions.get(id))
        .map(|row| {
            let opts = options.get(&row.id).map(Vec::as_slice).unwrap_or_default();
            PublicQuestion::new(row, opts)
        })
        .collect();

    tracing::info!(user_id, session_id, "Test session started");

    Ok(Json(StartTestResponse {
        test_session_id: session_id,
        questions: public,
    }))
}

/// Scores a submission and completes the session.
///
/// * The session must belong to the caller and still be `in_progress`.
/// * Each (question, option) pair earns 1 point when the option is the correct one.
/// * Unknown questions and options that do not belong to their question are skipped.
/// * Passing requires at least 12 points.
#[utoipa::path(
    post,
    path = "/api/test/submit",
    request_body = SubmitTestRequest,
    responses(
        (status = 200, description = "Session scored", body = SubmitTestResponse),
        (status = 400, description = "Invalid payload, or invalid or completed test session"),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "tests"
)]
pub async fn submit_test(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<SubmitTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let session = fetch_session(&mut tx, req.test_session_id)
        .await?
        .filter(|s| s.user_id == user_id && s.status == SessionStatus::InProgress)
        .ok_or_else(|| AppError::BadRequest("Invalid or completed test session".to_string()))?;

    // Resolve every referenced question and option in two round trips.
    let referenced: Vec<i64> = req
        .answers
        .iter()
        .map(|a| a.question_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let questions = fetch_questions(&mut tx, &referenced).await?;
    let question_ids: Vec<i64> = questions.keys().copied().collect();
    let options = fetch_options(&mut tx, &question_ids).await?;

    let option_keys: HashMap<i64, OptionKey> = options
        .values()
        .flatten()
        .map(|opt| {
            (
                opt.id,
                OptionKey {
                    question_id: opt.question_id,
                    is_correct: opt.is_correct,
                },
            )
        })
        .collect();
    let known: HashSet<i64> = questions.keys().copied().collect();

    let graded = grade_answers(&req.answers, &known, &option_keys);
    let score = total_score(&graded);
    let passed = is_passing(score, session.pass_threshold);
    let now = Utc::now();

    if !graded.is_empty() {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO test_answers (test_session_id, question_id, selected_option_id, is_correct, points_earned, answered_at) ",
        );
        builder.push_values(&graded, |mut b, answer| {
            b.push_bind(session.id)
                .push_bind(answer.question_id)
                .push_bind(answer.selected_option_id)
                .push_bind(answer.is_correct)
                .push_bind(answer.points_earned)
                .push_bind(now);
        });
        builder.build().execute(&mut *tx).await.map_err(|e| {
            tracing::error!("Failed to record answers: {:?}", e);
            AppError::from(e)
        })?;
    }

    // Guarded on the status so a concurrent submit cannot complete the session twice.
    let updated = sqlx::query(
        r#"
        UPDATE test_sessions
        SET status = ?, score = ?, passed = ?, time_completed = ?, time_taken_seconds = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(SessionStatus::Completed)
    .bind(score)
    .bind(passed)
    .bind(now)
    .bind(req.time_taken_seconds)
    .bind(session.id)
    .bind(SessionStatus::InProgress)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::BadRequest("Invalid or completed test session".to_string()));
    }

    let touched: BTreeSet<i64> = graded.iter().map(|a| a.question_id).collect();
    for question_id in &touched {
        QuestionAnalytics::refresh(&mut tx, *question_id).await?;
    }
    UserProfile::refresh(&mut tx, user_id).await?;

    let completed = fetch_session(&mut tx, session.id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Session vanished".to_string()))?;
    let answers = fetch_session_answers(&mut tx, &[session.id])
        .await?
        .remove(&session.id)
        .unwrap_or_default();

    tx.commit().await?;

    tracing::info!(
        user_id,
        session_id = session.id,
        score,
        passed,
        "Test session submitted"
    );

    let questions_review: Vec<ReviewQuestion> = touched
        .iter()
        .filter_map(|id| questions.get(id))
        .map(|row| {
            let opts = options.get(&row.id).map(Vec::as_slice).unwrap_or_default();
            ReviewQuestion::new(row, opts)
        })
        .collect();

    let user_answers: BTreeMap<i64, Option<i64>> = graded
        .iter()
        .map(|a| (a.question_id, a.selected_option_id))
        .collect();

    let breakdown: Vec<AnswerBreakdown> = graded
        .iter()
        .filter_map(|answer| {
            let row = questions.get(&answer.question_id)?;
            let opts = options.get(&answer.question_id).map(Vec::as_slice).unwrap_or_default();
            Some(breakdown_row(answer, row, opts, &completed.username))
        })
        .collect();

    let possible = breakdown.len() as i64;

    Ok(Json(SubmitTestResponse {
        test_session: SessionDetail::new(&completed, &answers),
        questions_review,
        user_answers,
        detailed_results: DetailedResults {
            total_points_earned: score,
            total_possible_points: possible,
            percentage: percentage(score, possible),
            answers_breakdown: breakdown,
        },
    }))
}

fn breakdown_row(
    answer: &GradedAnswer,
    question: &QuestionRow,
    options: &[AnswerOption],
    username: &str,
) -> AnswerBreakdown {
    let text_of = |id: i64| {
        options
            .iter()
            .find(|opt| opt.id == id)
            .map(|opt| opt.option_text.clone())
    };

    AnswerBreakdown {
        question_id: question.id,
        question_text: preview(&question.question_text, 100),
        user_answer: answer
            .selected_option_id
            .and_then(text_of)
            .unwrap_or_else(|| "Not answered".to_string()),
        correct_answer: options
            .iter()
            .find(|opt| opt.is_correct)
            .map(|opt| opt.option_text.clone())
            .unwrap_or_else(|| "N/A".to_string()),
        is_correct: answer.is_correct,
        points_earned: answer.points_earned,
        answered_by: username.to_string(),
    }
}

/// Lists the caller's completed sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/test/history",
    responses(
        (status = 200, description = "Completed sessions", body = Vec<SessionSummary>),
        (status = 401, description = "Not authenticated")
    ),
    security(("jwt" = [])),
    tag = "tests"
)]
pub async fn test_history(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let sessions = sqlx::query_as::<_, TestSession>(&format!(
        "{SESSION_SELECT} WHERE s.user_id = ? AND s.status = ? ORDER BY s.time_started DESC, s.id DESC"
    ))
    .bind(user_id)
    .bind(SessionStatus::Completed)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch test history: {:?}", e);
        AppError::from(e)
    })?;

    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
    Ok(Json(summaries))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20 questions (ids 1..=20), each with a correct option `id * 10`
    /// and a wrong option `id * 10 + 1`.
    fn bank() -> (HashSet<i64>, HashMap<i64, OptionKey>) {
        let mut known = HashSet::new();
        let mut options = HashMap::new();
        for q in 1..=20 {
            known.insert(q);
            options.insert(q * 10, OptionKey { question_id: q, is_correct: true });
            options.insert(q * 10 + 1, OptionKey { question_id: q, is_correct: false });
        }
        (known, options)
    }

    fn answers_with_correct(correct: i64) -> Vec<AnswerItem> {
        (1..=20)
            .map(|q| AnswerItem {
                question_id: q,
                selected_option_id: Some(if q <= correct { q * 10 } else { q * 10 + 1 }),
            })
            .collect()
    }

    #[test]
    fn all_correct_scores_twenty_and_passes() {
        let (known, options) = bank();
        let graded = grade_answers(&answers_with_correct(20), &known, &options);
        assert_eq!(graded.len(), 20);
        assert_eq!(total_score(&graded), 20);
        assert!(is_passing(total_score(&graded), PASS_THRESHOLD));
    }

    #[test]
    fn fifteen_correct_passes() {
        let (known, options) = bank();
        let graded = grade_answers(&answers_with_correct(15), &known, &options);
        assert_eq!(total_score(&graded), 15);
        assert!(is_passing(15, PASS_THRESHOLD));
        assert_eq!(graded.iter().filter(|a| !a.is_correct).count(), 5);
    }

    #[test]
    fn ten_correct_fails() {
        let (known, options) = bank();
        let graded = grade_answers(&answers_with_correct(10), &known, &options);
        assert_eq!(total_score(&graded), 10);
        assert!(!is_passing(10, PASS_THRESHOLD));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_passing(12, PASS_THRESHOLD));
        assert!(!is_passing(11, PASS_THRESHOLD));
    }

    #[test]
    fn unanswered_questions_are_recorded_with_zero_points() {
        let (known, options) = bank();
        let items = vec![AnswerItem { question_id: 3, selected_option_id: None }];
        let graded = grade_answers(&items, &known, &options);
        assert_eq!(
            graded,
            vec![GradedAnswer {
                question_id: 3,
                selected_option_id: None,
                is_correct: false,
                points_earned: 0,
            }]
        );
    }

    #[test]
    fn unknown_references_are_skipped() {
        let (known, options) = bank();
        let items = vec![
            // unknown question
            AnswerItem { question_id: 999, selected_option_id: Some(10) },
            // unknown option
            AnswerItem { question_id: 1, selected_option_id: Some(5) },
            // option belongs to question 2, not 3
            AnswerItem { question_id: 3, selected_option_id: Some(20) },
            // valid
            AnswerItem { question_id: 4, selected_option_id: Some(40) },
        ];
        let graded = grade_answers(&items, &known, &options);
        assert_eq!(graded.len(), 1);
        assert_eq!(graded[0].question_id, 4);
        assert_eq!(total_score(&graded), 1);
    }

    #[test]
    fn repeated_question_is_scored_once() {
        let (known, options) = bank();
        let items = vec![
            AnswerItem { question_id: 1, selected_option_id: Some(10) },
            AnswerItem { question_id: 1, selected_option_id: Some(10) },
        ];
        let graded = grade_answers(&items, &known, &options);
        assert_eq!(total_score(&graded), 1);
    }

    #[test]
    fn skipped_pair_does_not_block_a_later_valid_one() {
        let (known, options) = bank();
        let items = vec![
            AnswerItem { question_id: 1, selected_option_id: Some(20) },
            AnswerItem { question_id: 1, selected_option_id: Some(10) },
        ];
        let graded = grade_answers(&items, &known, &options);
        assert_eq!(graded.len(), 1);
        assert!(graded[0].is_correct);
    }
}
