pub mod handlers;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub use repo::CarouselImage;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/carousel",
        Router::new()
            .merge(handlers::read_routes())
            .merge(handlers::admin_routes()),
    )
}
