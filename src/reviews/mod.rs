mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
mod services;

use crate::state::AppState;
use axum::Router;

/// Review routes live at the API root (`/product/..`, `/review/..`,
/// `/reviews/me`, `/admin/review..`).
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::member_routes())
        .merge(handlers::write_routes())
        .merge(handlers::admin_routes())
}
