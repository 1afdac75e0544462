//! Task-aware assistant behind `POST /api/chatbot`.

pub mod handlers;
pub mod responder;

use crate::state::AppState;
use axum::Router;

pub use responder::{ChatContext, Responder, RuleBasedResponder, TaskStats};

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}
