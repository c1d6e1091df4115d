pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
mod services;

use crate::state::AppState;
use axum::Router;

pub use dto::ProductView;
pub use repo_types::ProductRow;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/products",
        Router::new()
            .merge(handlers::read_routes())
            .merge(handlers::write_routes()),
    )
}
