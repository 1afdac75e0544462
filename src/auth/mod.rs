use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod services;

pub use claims::{Claims, TokenKind};
pub use extractors::AuthUser;
pub use jwt::JwtKeys;
pub use otp::{LogNotifier, OtpNotifier};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
