//! Core types, config, errors, and chat-history model for Reelsmith.

pub mod config;
pub mod error;
pub mod history;
pub mod retry;
pub mod transcript;
pub mod types;
