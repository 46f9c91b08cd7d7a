// src/seed.rs

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    models::question::{Difficulty, OptionInput, validate_options},
    utils::hash::hash_password,
};

const QUESTION_BANK: &str = include_str!("../seed/questions.json");

#[derive(Debug, Deserialize)]
struct SeedBank {
    categories: Vec<SeedCategory>,
    questions: Vec<SeedQuestion>,
}

#[derive(Debug, Deserialize)]
struct SeedCategory {
    name: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct SeedQuestion {
    text: String,
    category: String,
    difficulty: Difficulty,
    options: Vec<String>,
    /// Index into `options`.
    correct: usize,
}

impl SeedQuestion {
    /// Builds the option set, enforcing the same rules as the admin API.
    fn option_inputs(&self) -> Result<Vec<OptionInput>, Box<dyn std::error::Error>> {
        if self.correct >= self.options.len() {
            return Err(format!(
                "seed question {:?}: correct index {} is out of range",
                self.text, self.correct
            )
            .into());
        }

        let inputs: Vec<OptionInput> = self
            .options
            .iter()
            .enumerate()
            .map(|(i, text)| OptionInput {
                option_text: text.clone(),
                is_correct: i == self.correct,
            })
            .collect();

        validate_options(&inputs)
            .map_err(|e| format!("seed question {:?}: {}", self.text, e))?;
        Ok(inputs)
    }
}

/// Creates the staff account from `ADMIN_USERNAME` / `ADMIN_PASSWORD` unless it exists.
pub async fn seed_admin_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if user_exists.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", username);
    let hashed_password = hash_password(password)?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password, is_staff, date_joined)
        VALUES (?, ?, TRUE, ?)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(&hashed_password)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_profiles (user_id, date_joined) VALUES (?, ?)")
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}

/// Loads the bundled categories and questions.
///
/// Categories are matched by name and questions by text, so running it again
/// inserts nothing. Returns the number of questions inserted.
pub async fn seed_questions(pool: &SqlitePool) -> Result<usize, Box<dyn std::error::Error>> {
    let bank: SeedBank = serde_json::from_str(QUESTION_BANK)?;
    insert_bank(pool, &bank).await
}

async fn insert_bank(
    pool: &SqlitePool,
    bank: &SeedBank,
) -> Result<usize, Box<dyn std::error::Error>> {
    // Reject a malformed bank before anything is written.
    let option_sets = bank
        .questions
        .iter()
        .map(SeedQuestion::option_inputs)
        .collect::<Result<Vec<_>, _>>()?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    for category in &bank.categories {
        sqlx::query(
            r#"
            INSERT INTO question_categories (name, description, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let mut inserted = 0;
    for (question, options) in bank.questions.iter().zip(&option_sets) {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM questions WHERE question_text = ?")
                .bind(&question.text)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_some() {
            continue;
        }

        let category_id: i64 =
            sqlx::query_scalar("SELECT id FROM question_categories WHERE name = ?")
                .bind(&question.category)
                .fetch_one(&mut *tx)
                .await?;

        let question_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions (question_text, category_id, difficulty, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&question.text)
        .bind(category_id)
        .bind(question.difficulty)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for (i, option) in options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO answer_options (question_id, option_text, is_correct, display_order)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(question_id)
            .bind(&option.option_text)
            .bind(option.is_correct)
            .bind(i as i64 + 1)
            .execute(&mut *tx)
            .await?;
        }

        inserted += 1;
    }

    tx.commit().await?;
    tracing::info!(inserted, "Question bank seeded");
    Ok(inserted)
}
