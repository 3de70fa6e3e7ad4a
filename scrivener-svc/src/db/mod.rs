//! Storage layer database operations

pub mod transcripts;
pub mod users;
