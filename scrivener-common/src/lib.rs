//! # Scrivener Common Library
//!
//! Shared code for the scrivener transcription service:
//! - Error types
//! - Root folder and configuration resolution
//! - Database initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
