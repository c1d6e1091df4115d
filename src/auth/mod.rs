use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod extractors;
pub mod google;
pub mod handlers;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod session;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new().nest("/auth", handlers::auth_routes())
}
