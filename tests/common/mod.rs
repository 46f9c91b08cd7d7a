// tests/common/mod.rs

#![allow(dead_code)]

use std::time::Duration;

use axum::{ServiceExt, extract::Request};
use driving_test_backend::{config::Config, routes, seed, state::AppState};
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port, backed by a private in-memory database.
pub async fn spawn_app() -> TestApp {
    // One connection that never expires, so the in-memory database lives as long as the pool.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(10))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        server_port: 0,
        admin_username: None,
        admin_password: None,
        seed_questions: false,
    };

    let state = AppState::new(pool.clone(), config);

    let app = routes::create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
            .await
            .unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    }
}

/// Same as [`spawn_app`] with the bundled question bank loaded.
pub async fn spawn_seeded_app() -> TestApp {
    let app = spawn_app().await;
    seed::seed_questions(&app.pool)
        .await
        .expect("Failed to seed questions");
    app
}

pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers a fresh user and returns `(token, user_id)`.
    pub async fn register(&self, username: &str) -> (String, i64) {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "password123",
                "password_confirm": "password123",
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = response.json().await.unwrap();
        (
            body["token"].as_str().unwrap().to_string(),
            body["user_id"].as_i64().unwrap(),
        )
    }

    /// Creates a staff account and returns its token.
    pub async fn staff_token(&self) -> String {
        let username = unique_name("staff");
        seed::seed_admin_user(&self.pool, &username, "adminpass123")
            .await
            .expect("Failed to seed staff user");

        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": "adminpass123" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["is_staff"], true);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Starts a session and returns its id plus the served questions.
    pub async fn start_test(&self, token: &str) -> (i64, Vec<Value>) {
        let response = self.get("/api/test/start", token).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        (
            body["test_session_id"].as_i64().unwrap(),
            body["questions"].as_array().unwrap().clone(),
        )
    }

    pub async fn correct_option(&self, question_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT id FROM answer_options WHERE question_id = ? AND is_correct = TRUE",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    pub async fn wrong_option(&self, question_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT id FROM answer_options WHERE question_id = ? AND is_correct = FALSE ORDER BY display_order LIMIT 1",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    /// Answers for the served questions: the first `correct` right, the rest wrong.
    pub async fn answers(&self, questions: &[Value], correct: usize) -> Vec<Value> {
        let mut answers = Vec::with_capacity(questions.len());
        for (i, question) in questions.iter().enumerate() {
            let question_id = question["id"].as_i64().unwrap();
            let option = if i < correct {
                self.correct_option(question_id).await
            } else {
                self.wrong_option(question_id).await
            };
            answers.push(json!({ "question_id": question_id, "selected_option_id": option }));
        }
        answers
    }
}
