#![forbid(unsafe_code)]

//! Proactive hub: natural-language reminders, scheduled prompt-driven
//! intentions, and live fan-out of their output to WebSocket clients.

pub mod agent;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod intentions;
pub mod models;
pub mod persistence;
pub mod reminders;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
