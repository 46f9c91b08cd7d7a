// src/models/question.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const MIN_OPTIONS: usize = 3;
pub const MAX_OPTIONS: usize = 5;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A 'questions' row joined with its category name and author.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub question_text: String,
    pub category_id: i64,
    pub category_name: String,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub explanation: String,
    pub is_active: bool,
    pub created_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents the 'answer_options' table.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
    pub display_order: i64,
}

/// Option as shown while a test is being taken: no correctness flag.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicOption {
    pub id: i64,
    pub option_text: String,
    pub order: i64,
}

/// Option with its correctness flag, for review and management views.
#[derive(Debug, Serialize, ToSchema)]
pub struct OptionWithAnswer {
    pub id: i64,
    pub option_text: String,
    pub is_correct: bool,
    pub order: i64,
}

impl From<&AnswerOption> for PublicOption {
    fn from(opt: &AnswerOption) -> Self {
        Self {
            id: opt.id,
            option_text: opt.option_text.clone(),
            order: opt.display_order,
        }
    }
}

impl From<&AnswerOption> for OptionWithAnswer {
    fn from(opt: &AnswerOption) -> Self {
        Self {
            id: opt.id,
            option_text: opt.option_text.clone(),
            is_correct: opt.is_correct,
            order: opt.display_order,
        }
    }
}

/// DTO for sending a question to a test taker (hides the answer key and explanation).
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_text: String,
    pub category: i64,
    pub category_name: String,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub options: Vec<PublicOption>,
}

impl PublicQuestion {
    pub fn new(row: &QuestionRow, options: &[AnswerOption]) -> Self {
        Self {
            id: row.id,
            question_text: row.question_text.clone(),
            category: row.category_id,
            category_name: row.category_name.clone(),
            difficulty: row.difficulty,
            image_url: row.image_url.clone(),
            options: options.iter().map(PublicOption::from).collect(),
        }
    }
}

/// Question with its answer key, returned after a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewQuestion {
    pub id: i64,
    pub question_text: String,
    pub category: i64,
    pub category_name: String,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub explanation: String,
    pub options: Vec<OptionWithAnswer>,
}

impl ReviewQuestion {
    pub fn new(row: &QuestionRow, options: &[AnswerOption]) -> Self {
        Self {
            id: row.id,
            question_text: row.question_text.clone(),
            category: row.category_id,
            category_name: row.category_name.clone(),
            difficulty: row.difficulty,
            image_url: row.image_url.clone(),
            explanation: row.explanation.clone(),
            options: options.iter().map(OptionWithAnswer::from).collect(),
        }
    }
}

/// Full question view for listing and detail endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionDetail {
    pub id: i64,
    pub question_text: String,
    pub category: i64,
    pub category_name: String,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub explanation: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by_username: Option<String>,
    pub options: Vec<OptionWithAnswer>,
}

impl QuestionDetail {
    pub fn new(row: QuestionRow, options: &[AnswerOption]) -> Self {
        Self {
            id: row.id,
            question_text: row.question_text,
            category: row.category_id,
            category_name: row.category_name,
            difficulty: row.difficulty,
            image_url: row.image_url,
            explanation: row.explanation,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by_username: row.created_by_username,
            options: options.iter().map(OptionWithAnswer::from).collect(),
        }
    }
}

/// Query parameters for listing questions.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuestionListParams {
    /// Category id.
    pub category: Option<i64>,
    pub difficulty: Option<Difficulty>,
    /// Case-insensitive substring of the question text.
    pub search: Option<String>,
}

/// One answer option in a create/update request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OptionInput {
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 10, max = 5000, message = "Question text must be at least 10 characters."))]
    pub question_text: String,
    pub category_id: i64,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub image_url: Option<String>,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
    pub is_active: Option<bool>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
}

/// DTO for updating a question. Fields are optional; `options` replaces the whole set.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 10, max = 5000, message = "Question text must be at least 10 characters."))]
    pub question_text: Option<String>,
    pub category_id: Option<i64>,
    pub difficulty: Option<Difficulty>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub image_url: Option<String>,
    #[validate(length(max = 5000))]
    pub explanation: Option<String>,
    pub is_active: Option<bool>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<OptionInput>>,
}

fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// A published question carries 3 to 5 non-empty options, exactly one of them correct.
pub fn validate_options(options: &[OptionInput]) -> Result<(), validator::ValidationError> {
    if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
        return Err(validator::ValidationError::new("option_count")
            .with_message("A question must have between 3 and 5 options.".into()));
    }
    for opt in options {
        let len = opt.option_text.trim().chars().count();
        if len == 0 || len > 200 {
            return Err(validator::ValidationError::new("option_text_length")
                .with_message("Option text must be between 1 and 200 characters.".into()));
        }
    }
    let correct = options.iter().filter(|opt| opt.is_correct).count();
    if correct != 1 {
        return Err(validator::ValidationError::new("single_correct_option")
            .with_message("Exactly one option must be marked correct.".into()));
    }
    Ok(())
}
