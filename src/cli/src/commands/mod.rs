//! CLI command implementations.

pub mod catalog;
pub mod config;
pub mod health;
pub mod play;
