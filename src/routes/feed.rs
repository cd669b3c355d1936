use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, PostForm};
use crate::feed::{ImageInput, PostId};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Missing, unparsable and non-positive values all mean the first page.
    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .map(|p| p.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(1)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed/posts", get(list_posts))
        .route("/feed/post", post(create_post))
        .route(
            "/feed/post/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let page = state
        .posts
        .list_posts(query.page(), state.config.feed.per_page)
        .await?;

    Ok(Json(json!({
        "message": "Fetched posts successfully.",
        "posts": page.posts,
        "totalItems": page.total_items,
    }))
    .into_response())
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    form: PostForm,
) -> AppResult<Response> {
    let post = state
        .posts
        .create_post(&user.id, &form.title, &form.content, form.upload)
        .await?;

    let creator = post.creator.clone();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Post created successfully!",
            "post": post,
            "creator": creator,
        })),
    )
        .into_response())
}

async fn get_post(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let post = state.posts.get_post(&PostId::new(id)).await?;
    Ok(Json(json!({ "message": "Post fetched.", "post": post })).into_response())
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    form: PostForm,
) -> AppResult<Response> {
    let PostForm {
        title,
        content,
        upload,
        image_url,
    } = form;
    let image = ImageInput {
        upload,
        existing_url: image_url,
    };

    let post = state
        .posts
        .update_post(&user.id, &PostId::new(id), &title, &content, image)
        .await?;

    Ok(Json(json!({ "message": "Post updated!", "post": post })).into_response())
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.posts.delete_post(&user.id, &PostId::new(id)).await?;
    Ok(Json(json!({ "message": "Deleted post." })).into_response())
}
