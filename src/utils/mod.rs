// src/utils/mod.rs

pub mod extract;
pub mod format;
pub mod hash;
pub mod html;
pub mod jwt;
pub mod pagination;
