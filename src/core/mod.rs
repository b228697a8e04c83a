//! Core types: configuration, errors, data model, and the directory
//! crawl engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
