pub mod auth;
pub mod feed;
pub mod images;
pub mod socket;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// The full HTTP surface: auth, feed, stored images and the notification socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(auth::router())
        .merge(feed::router())
        .merge(images::router(&state.config.storage.public_prefix))
        .merge(socket::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
