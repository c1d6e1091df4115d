//! Push notifications over WebSocket: the `join` / `lowStock` / `priceAlert`
//! events the storefront listens for.

pub mod handlers;
mod notifier;

pub use notifier::{Event, Notifier, ADMIN_ROOM};

use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(handlers::ws_upgrade))
}
