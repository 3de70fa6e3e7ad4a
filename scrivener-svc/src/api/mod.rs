//! HTTP API handlers

pub mod health;
pub mod transcripts;
pub mod users;
