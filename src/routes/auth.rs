use axum::routing::{post, put};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", put(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
}
