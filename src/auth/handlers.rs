use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, CurrentUser};
use crate::feed::domain::field_errors;
use crate::feed::repository::RepositoryError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Please enter a valid email."))]
    pub email: String,
    #[validate(length(min = 1, message = "Name must not be empty."))]
    pub name: String,
    #[validate(length(min = 5, message = "Password must be at least 5 characters long."))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Handlers --

pub async fn signup(
    State(state): State<AppState>,
    AppJson(mut req): AppJson<SignupRequest>,
) -> AppResult<Response> {
    req.email = req.email.trim().to_lowercase();
    req.name = req.name.trim().to_string();
    req.validate()
        .map_err(|errors| AppError::Validation(field_errors(&errors)))?;

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let user = match state.users.create(&req.email, &req.name, &password_hash).await {
        Ok(user) => user,
        Err(RepositoryError::Conflict(_)) => {
            return Err(AppError::Conflict("E-Mail address already exists!".into()))
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("User {} signed up", user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created!", "userId": user.id })),
    )
        .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(req.password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .unwrap_or(false);
    if !matches {
        return Err(AppError::InvalidCredentials);
    }

    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;

    Ok(Json(json!({ "token": token, "userId": user.id })).into_response())
}

pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    session::delete_session(&state.db, &user.token)?;
    Ok(Json(json!({ "message": "Logged out." })).into_response())
}
