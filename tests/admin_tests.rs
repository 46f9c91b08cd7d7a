// tests/admin_tests.rs

mod common;

use common::{spawn_app, spawn_seeded_app, unique_name};
use serde_json::{Value, json};

fn question_payload(category_id: i64, options: Value) -> Value {
    json!({
        "question_text": "What does a flashing amber light mean?",
        "category_id": category_id,
        "difficulty": "hard",
        "explanation": "Proceed with caution.",
        "options": options,
    })
}

async fn first_category(app: &common::TestApp) -> i64 {
    sqlx::query_scalar("SELECT id FROM question_categories ORDER BY id LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn non_staff_get_403() {
    let app = spawn_app().await;
    let (token, _) = app.register(&unique_name("plain")).await;

    for path in [
        "/api/admin/test-sessions",
        "/api/admin/user-activities",
        "/api/admin/user-test-history?user_id=1",
        "/api/admin/analytics",
    ] {
        let response = app.get(path, &token).await;
        assert_eq!(response.status().as_u16(), 403, "{path}");
    }

    let response = app.client.get(app.url("/api/admin/analytics")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_sessions_are_paginated_and_filtered() {
    let app = spawn_seeded_app().await;
    let staff = app.staff_token().await;
    let (token, user_id) = app.register(&unique_name("taker")).await;

    let (first, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 13).await;
    app.post(
        "/api/test/submit",
        &token,
        &json!({ "test_session_id": first, "answers": answers, "time_taken_seconds": 50 }),
    )
    .await;
    app.start_test(&token).await;
    app.start_test(&token).await;

    let page: Value = app
        .get("/api/admin/test-sessions?page=1&limit=2", &staff)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["count"], 3);
    assert_eq!(page["next"], "?page=2&limit=2");
    assert!(page["previous"].is_null());
    assert_eq!(page["results"].as_array().unwrap().len(), 2);

    let completed: Value = app
        .get(
            &format!("/api/admin/test-sessions?status=completed&user={user_id}"),
            &staff,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(completed["count"], 1);
    let session = &completed["results"][0];
    assert_eq!(session["score"], 13);
    assert_eq!(session["answers"].as_array().unwrap().len(), 20);
    assert_eq!(session["user_email"], format!("{}@example.com", session["username"].as_str().unwrap()));
}

#[tokio::test]
async fn bad_listing_parameters_are_400() {
    let app = spawn_app().await;
    let staff = app.staff_token().await;

    for path in [
        "/api/admin/test-sessions?page=0",
        "/api/admin/test-sessions?limit=abc",
        "/api/admin/test-sessions?user=abc",
        "/api/admin/test-sessions?status=finished",
        "/api/admin/user-activities?page=-1",
        "/api/admin/test-sessions?page=9223372036854775807&limit=100",
        "/api/admin/user-activities?page=9223372036854775807",
        "/api/admin/analytics?days=week",
    ] {
        let response = app.get(path, &staff).await;
        assert_eq!(response.status().as_u16(), 400, "{path}");
    }

    let body: Value = app
        .get("/api/admin/test-sessions?page=0", &staff)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"], "Invalid pagination parameters");

    let body: Value = app
        .get("/api/admin/test-sessions?page=9223372036854775807&limit=100", &staff)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"], "Invalid pagination parameters");
}

#[tokio::test]
async fn limit_is_capped_at_one_hundred() {
    let app = spawn_app().await;
    let staff = app.staff_token().await;

    let response = app.get("/api/admin/test-sessions?limit=500", &staff).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn abandon_only_moves_in_progress_sessions() {
    let app = spawn_seeded_app().await;
    let staff = app.staff_token().await;
    let (token, _) = app.register(&unique_name("quit")).await;
    let (session_id, _) = app.start_test(&token).await;

    let path = format!("/api/admin/test-sessions/{session_id}/abandon");
    let response = app.post(&path, &staff, &json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "abandoned");

    assert_eq!(app.post(&path, &staff, &json!({})).await.status().as_u16(), 400);

    let submit = app
        .post(
            "/api/test/submit",
            &token,
            &json!({ "test_session_id": session_id, "answers": [], "time_taken_seconds": 5 }),
        )
        .await;
    assert_eq!(submit.status().as_u16(), 400);

    let missing = app
        .post("/api/admin/test-sessions/987654/abandon", &staff, &json!({}))
        .await;
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn user_activities_list_profiles() {
    let app = spawn_app().await;
    let staff = app.staff_token().await;
    let (_, inactive_id) = app.register(&unique_name("gone")).await;
    app.register(&unique_name("here")).await;

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(inactive_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let all: Value = app
        .get("/api/admin/user-activities", &staff)
        .await
        .json()
        .await
        .unwrap();
    // two registered users plus the staff account
    assert_eq!(all["count"], 3);
    assert_eq!(all["results"].as_array().unwrap().len(), 3);

    let active: Value = app
        .get("/api/admin/user-activities?active_only=true", &staff)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(active["count"], 2);
}

#[tokio::test]
async fn user_test_history_validates_user_id() {
    let app = spawn_app().await;
    let staff = app.staff_token().await;
    let (_, user_id) = app.register(&unique_name("hist")).await;

    let missing = app.get("/api/admin/user-test-history", &staff).await;
    assert_eq!(missing.status().as_u16(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "user_id parameter is required");

    let not_int = app.get("/api/admin/user-test-history?user_id=abc", &staff).await;
    assert_eq!(not_int.status().as_u16(), 400);

    let unknown = app.get("/api/admin/user-test-history?user_id=999999", &staff).await;
    assert_eq!(unknown.status().as_u16(), 404);

    let found = app
        .get(&format!("/api/admin/user-test-history?user_id={user_id}"), &staff)
        .await;
    assert_eq!(found.status().as_u16(), 200);
    let body: Value = found.json().await.unwrap();
    assert_eq!(body["user_info"]["id"], user_id);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn analytics_summarize_activity() {
    let app = spawn_seeded_app().await;
    let staff = app.staff_token().await;
    let (token, _) = app.register(&unique_name("an")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 12).await;
    app.post(
        "/api/test/submit",
        &token,
        &json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 70 }),
    )
    .await;

    let response = app.get("/api/admin/analytics?days=0", &staff).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["period_days"], 30);
    assert_eq!(body["total_users"], 2);
    assert_eq!(body["total_tests"], 1);
    assert_eq!(body["recent_tests"], 1);
    assert_eq!(body["average_score"], 12.0);
    assert_eq!(body["pass_rate"], 100.0);
    assert_eq!(body["recent_activity"]["active_questions"], 26);

    let hardest = body["most_difficult_questions"].as_array().unwrap();
    assert_eq!(hardest.len(), 5);
    assert!(hardest.iter().all(|q| q["success_rate"] == 0.0));
}

#[tokio::test]
async fn question_management_enforces_option_rules() {
    let app = spawn_seeded_app().await;
    let staff = app.staff_token().await;
    let category = first_category(&app).await;

    let two_options = question_payload(
        category,
        json!([{ "option_text": "Stop", "is_correct": true }, { "option_text": "Go" }]),
    );
    let response = app.post("/api/admin/questions", &staff, &two_options).await;
    assert_eq!(response.status().as_u16(), 400);

    let two_correct = question_payload(
        category,
        json!([
            { "option_text": "Stop", "is_correct": true },
            { "option_text": "Slow down", "is_correct": true },
            { "option_text": "Go" }
        ]),
    );
    let response = app.post("/api/admin/questions", &staff, &two_correct).await;
    assert_eq!(response.status().as_u16(), 400);

    let valid = question_payload(
        category,
        json!([
            { "option_text": "Stop" },
            { "option_text": "Proceed with caution", "is_correct": true },
            { "option_text": "<b>Speed up</b><script>alert(1)</script>" }
        ]),
    );
    let response = app.post("/api/admin/questions", &staff, &valid).await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["difficulty"], "hard");
    assert_eq!(created["options"].as_array().unwrap().len(), 3);
    assert_eq!(created["options"][2]["option_text"], "<b>Speed up</b>");
    assert!(created["created_by_username"].is_string());

    let id = created["id"].as_i64().unwrap();
    let response = app
        .client
        .put(app.url(&format!("/api/admin/questions/{id}")))
        .bearer_auth(&staff)
        .json(&json!({ "is_active": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["is_active"], false);

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/questions/{id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn answered_question_keeps_its_options() {
    let app = spawn_seeded_app().await;
    let staff = app.staff_token().await;
    let (token, _) = app.register(&unique_name("ans")).await;
    let (session_id, questions) = app.start_test(&token).await;
    let answers = app.answers(&questions, 20).await;
    app.post(
        "/api/test/submit",
        &token,
        &json!({ "test_session_id": session_id, "answers": answers, "time_taken_seconds": 70 }),
    )
    .await;

    let id = questions[0]["id"].as_i64().unwrap();
    let response = app
        .client
        .put(app.url(&format!("/api/admin/questions/{id}")))
        .bearer_auth(&staff)
        .json(&json!({ "options": [
            { "option_text": "A", "is_correct": true },
            { "option_text": "B" },
            { "option_text": "C" }
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/questions/{id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn category_management() {
    let app = spawn_app().await;
    let staff = app.staff_token().await;

    let response = app
        .post(
            "/api/admin/categories",
            &staff,
            &json!({ "name": "  night driving ", "description": "After dark" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["name"], "Night Driving");
    assert_eq!(created["question_count"], 0);

    let duplicate = app
        .post("/api/admin/categories", &staff, &json!({ "name": "NIGHT DRIVING" }))
        .await;
    assert_eq!(duplicate.status().as_u16(), 409);

    let id = created["id"].as_i64().unwrap();
    let response = app
        .client
        .put(app.url(&format!("/api/admin/categories/{id}")))
        .bearer_auth(&staff)
        .json(&json!({ "description": "Lights and visibility" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["description"], "Lights and visibility");

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/categories/{id}")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}
