//! Core types, config, errors, and retry policy for browserd.

pub mod config;
pub mod error;
pub mod retry;
pub mod types;
