// tests/test_session_tests.rs

mod common;

use common::{spawn_app, spawn_seeded_app, unique_name};
use serde_json::{Value, json};

async fn submit(app: &common::TestApp, token: &str, body: Value) -> reqwest::Response {
    app.post("/api/test/submit", token, &body).await
}

#[tokio::test]
async fn start_serves_twenty_questions_without_answer_key() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("start")).await;

    let (session_id, questions) = app.start_test(&token).await;
    assert!(session_id > 0);
    assert_eq!(questions.len(), 20);

    for question in &questions {
        let options = question["options"].as_array().unwrap();
        assert!(!options.is_empty());
        assert!(options.iter().all(|opt| opt.get("is_correct").is_none()));
        assert!(question.get("explanation").is_none());
    }

    let status: String = sqlx::query_scalar("SELECT status FROM test_sessions WHERE id = ?")
        .bind(session_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(status, "in_progress");
}

#[tokio::test]
async fn start_also_accepts_post() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("start")).await;

    let response = app.post("/api/test/start", &token, &json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn start_needs_twenty_active_questions() {
    let app = spawn_app().await;
    let (token, _) = app.register(&unique_name("empty")).await;

    let response = app.get("/api/test/start", &token).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not enough questions available");
}

#[tokio::test]
async fn all_correct_scores_twenty_and_passes() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("ace")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 20).await;

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 615 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    let session = &body["test_session"];
    assert_eq!(session["score"], 20);
    assert_eq!(session["passed"], true);
    assert_eq!(session["status"], "completed");
    assert_eq!(session["pass_percentage"], 100.0);
    assert_eq!(session["duration_formatted"], "10m 15s");
    assert_eq!(session["answers"].as_array().unwrap().len(), 20);

    let results = &body["detailed_results"];
    assert_eq!(results["total_points_earned"], 20);
    assert_eq!(results["total_possible_points"], 20);
    assert_eq!(results["answers_breakdown"].as_array().unwrap().len(), 20);
    assert_eq!(body["questions_review"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn fifteen_correct_passes() {
    let app = spawn_seeded_app().await;
    let (token, user_id) = app.register(&unique_name("pass")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 15).await;

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 300 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["test_session"]["score"], 15);
    assert_eq!(body["test_session"]["passed"], true);
    assert_eq!(body["detailed_results"]["percentage"], 75.0);

    let (taken, passed, best): (i64, i64, i64) = sqlx::query_as(
        "SELECT total_tests_taken, total_tests_passed, best_score FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!((taken, passed, best), (1, 1, 15));
}

#[tokio::test]
async fn ten_correct_fails() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("fail")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 10).await;

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 100 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["test_session"]["score"], 10);
    assert_eq!(body["test_session"]["passed"], false);
}

#[tokio::test]
async fn submission_refreshes_question_analytics() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("stats")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 20).await;
    let first = questions[0]["id"].as_i64().unwrap();

    submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 60 }),
    )
    .await;

    let (total, correct): (i64, i64) = sqlx::query_as(
        "SELECT total_attempts, correct_attempts FROM question_analytics WHERE question_id = ?",
    )
    .bind(first)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!((total, correct), (1, 1));
}

#[tokio::test]
async fn nonexistent_session_is_400() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("ghost")).await;

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": 99999, "answers": [], "time_taken_seconds": 10 }),
    )
    .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or completed test session");
}

#[tokio::test]
async fn another_users_session_is_400() {
    let app = spawn_seeded_app().await;
    let (owner, _) = app.register(&unique_name("owner")).await;
    let (intruder, _) = app.register(&unique_name("intruder")).await;
    let (session_id, _) = app.start_test(&owner).await;

    let response = submit(
        &app,
        &intruder,
        json!({ "test_session_id": session_id, "answers": [], "time_taken_seconds": 10 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn each_missing_field_is_400() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("partial")).await;
    let (session_id, _) = app.start_test(&token).await;

    let bodies = [
        json!({ "answers": [], "time_taken_seconds": 10 }),
        json!({ "test_session_id": session_id, "time_taken_seconds": 10 }),
        json!({ "test_session_id": session_id, "answers": [] }),
    ];

    for body in bodies {
        let response = submit(&app, &token, body.clone()).await;
        assert_eq!(response.status().as_u16(), 400, "body: {body}");
        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }
}

#[tokio::test]
async fn negative_time_is_400() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("neg")).await;
    let (session_id, _) = app.start_test(&token).await;

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": [], "time_taken_seconds": -5 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unauthenticated_submit_is_401() {
    let app = spawn_seeded_app().await;

    let response = app
        .client
        .post(app.url("/api/test/submit"))
        .json(&json!({ "test_session_id": 1, "answers": [], "time_taken_seconds": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn resubmitting_a_completed_session_is_400() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("twice")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 12).await;
    let body = json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 30 });

    assert_eq!(submit(&app, &token, body.clone()).await.status().as_u16(), 200);
    assert_eq!(submit(&app, &token, body).await.status().as_u16(), 400);

    let answers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM test_answers WHERE test_session_id = ?")
        .bind(session_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(answers, 20);
}

#[tokio::test]
async fn unresolved_and_repeated_answers_are_skipped() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("messy")).await;
    let (session_id, questions) = app.start_test(&token).await;

    let q1 = questions[0]["id"].as_i64().unwrap();
    let q2 = questions[1]["id"].as_i64().unwrap();
    let right1 = app.correct_option(q1).await;
    let right2 = app.correct_option(q2).await;

    let answers = json!([
        { "question_id": q1, "selected_option_id": right1 },
        { "question_id": q1, "selected_option_id": right1 },
        { "question_id": 999999, "selected_option_id": right1 },
        { "question_id": q2, "selected_option_id": right1 },
        { "question_id": q2, "selected_option_id": right2 },
    ]);

    let response = submit(
        &app,
        &token,
        json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 45 }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["test_session"]["score"], 2);
    assert_eq!(body["test_session"]["passed"], false);
    assert_eq!(body["detailed_results"]["answers_breakdown"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn history_and_stats_reflect_completed_sessions() {
    let app = spawn_seeded_app().await;
    let (token, _) = app.register(&unique_name("hist")).await;

    for correct in [15, 8] {
        let (session_id, questions) = app.start_test(&token).await;
        let answers = app.answers(&questions, correct).await;
        submit(
            &app,
            &token,
            json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 90 }),
        )
        .await;
    }
    // Left in progress, so it stays out of history and stats.
    app.start_test(&token).await;

    let history: Value = app.get("/api/test/history", &token).await.json().await.unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s["status"] == "completed"));

    let response = app.get("/api/user/stats", &token).await;
    assert_eq!(response.status().as_u16(), 200);
    let stats: Value = response.json().await.unwrap();
    assert_eq!(stats["total_tests"], 2);
    assert_eq!(stats["passed_tests"], 1);
    assert_eq!(stats["pass_rate"], 50.0);
    assert_eq!(stats["average_score"], 11.5);
    assert_eq!(stats["best_score"], 15);
    assert_eq!(stats["recent_tests"].as_array().unwrap().len(), 2);

    let profile: Value = app.get("/api/user/profile", &token).await.json().await.unwrap();
    assert_eq!(profile["total_tests_taken"], 2);
    assert_eq!(profile["best_score"], 15);
}

#[tokio::test]
async fn profile_is_created_on_first_access() {
    let app = spawn_app().await;
    let (token, user_id) = app.register(&unique_name("prof")).await;

    sqlx::query("DELETE FROM user_profiles WHERE user_id = ?")
        .bind(user_id)
        .execute(&app.pool)
        .await
        .unwrap();

    assert_eq!(app.get("/api/user/profile", &token).await.status().as_u16(), 201);
    assert_eq!(app.get("/api/user/profile", &token).await.status().as_u16(), 200);
}
