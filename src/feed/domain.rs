// Domain types for the post lifecycle. No I/O in here.
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationErrors};

use crate::db::models::Post;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Title and content as submitted, trimmed.
#[derive(Debug, Clone, Validate)]
pub struct PostDraft {
    #[validate(length(min = 1, message = "Title must not be empty."))]
    pub title: String,
    #[validate(length(
        min = 5,
        message = "Content must be at least 5 characters long."
    ))]
    pub content: String,
}

impl PostDraft {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
        }
    }

    /// Field-level problems, sorted by field name. Empty when the draft is valid.
    pub fn problems(&self) -> Vec<FieldError> {
        match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => field_errors(&errors),
        }
    }
}

/// Flattens validator output into `{field, message}` pairs, sorted by field.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut problems: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    problems.sort_by(|a, b| a.field.cmp(&b.field));
    problems
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// An uploaded file before it reaches the asset store.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Image input for an update: a fresh upload, the URL already on file, or both.
#[derive(Debug, Clone, Default)]
pub struct ImageInput {
    pub upload: Option<UploadedImage>,
    pub existing_url: Option<String>,
}

impl ImageInput {
    pub fn is_empty(&self) -> bool {
        self.upload.is_none()
            && self
                .existing_url
                .as_deref()
                .map(|u| u.trim().is_empty())
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
}

/// A post with its creator resolved, as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(rename = "_id")]
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub creator: Creator,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    pub fn from_post(post: Post, creator_name: impl Into<String>) -> Self {
        Self {
            creator: Creator {
                id: post.creator,
                name: creator_name.into(),
            },
            id: post.id,
            title: post.title,
            content: post.content,
            image_url: post.image_url,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

/// One page of the feed, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub total_items: u64,
}

/// Notification pushed to every connected client after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "post", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Create(PostView),
    Update(PostView),
    Delete(PostId),
}

impl LifecycleEvent {
    pub fn post_id(&self) -> &PostId {
        match self {
            LifecycleEvent::Create(view) | LifecycleEvent::Update(view) => &view.id,
            LifecycleEvent::Delete(id) => id,
        }
    }
}
