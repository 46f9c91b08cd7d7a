// src/models/mod.rs

pub mod analytics;
pub mod category;
pub mod question;
pub mod test_session;
pub mod user;
