mod dto;
pub mod handlers;
pub mod repo;
mod services;

use crate::state::AppState;
use axum::Router;

pub use repo::Category;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/categories",
        Router::new()
            .merge(handlers::read_routes())
            .merge(handlers::write_routes()),
    )
}
