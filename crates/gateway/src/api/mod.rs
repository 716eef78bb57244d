pub mod health;
pub mod media;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the HTTP router.
///
/// Every route is public: the webhook authenticates by body signature and
/// media links by their signed query string.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook", post(webhook::receive))
        .route("/media/*key", get(media::serve))
}
