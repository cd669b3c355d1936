use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::Deserialize;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::feed::domain::{UploadedImage, UserId};
use crate::state::AppState;

/// JSON body whose rejection renders through `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// The verified identity behind a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub token: String,
}

/// Extractor that requires authentication.
/// Returns 401 unless the request carries `Authorization: Bearer <token>` for a live session.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated)?;

        let id = session::resolve_token(&state.db, token)?.ok_or(AppError::Unauthenticated)?;

        Ok(CurrentUser {
            id,
            token: token.to_string(),
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Post fields from either a multipart form or a JSON body.
///
/// In a form, `image` is a file upload when the part carries a file name and
/// the URL of the current image otherwise. JSON bodies can only name a URL.
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub upload: Option<UploadedImage>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
struct PostJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, alias = "imageUrl")]
    image: Option<String>,
}

impl PostForm {
    async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = field.text().await.map_err(bad_multipart)?,
                "content" => form.content = field.text().await.map_err(bad_multipart)?,
                "image" | "imageUrl" => match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let content_type = field
                            .content_type()
                            .unwrap_or("application/octet-stream")
                            .to_string();
                        let data = field.bytes().await.map_err(bad_multipart)?;
                        // Browsers send an empty part when no file was picked
                        if !file_name.is_empty() && !data.is_empty() {
                            form.upload = Some(UploadedImage {
                                file_name,
                                content_type,
                                data,
                            });
                        }
                    }
                    None => {
                        let url = field.text().await.map_err(bad_multipart)?;
                        if !url.trim().is_empty() {
                            form.image_url = Some(url.trim().to_string());
                        }
                    }
                },
                other => tracing::debug!("Ignoring form field {}", other),
            }
        }

        Ok(form)
    }
}

impl FromRequest<AppState> for PostForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<PostJson>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(PostForm {
                title: body.title,
                content: body.content,
                upload: None,
                image_url: body.image.filter(|url| !url.trim().is_empty()),
            })
        } else {
            Err(AppError::BadRequest(
                "Expected a multipart/form-data or application/json body.".into(),
            ))
        }
    }
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::BadRequest(e.body_text())
}
