//! Personal task manager API: accounts with OTP password reset, per-user
//! tasks, and a task-aware chat assistant.

pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod state;
pub mod store;
pub mod tasks;
