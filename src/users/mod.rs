mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod wishlist;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/users",
        Router::new()
            .merge(handlers::account_routes())
            .merge(handlers::admin_routes())
            .merge(handlers::wishlist_routes()),
    )
}
