use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::Post;
use crate::feed::assets::{AssetError, AssetStore};
use crate::feed::broadcaster::Broadcaster;
use crate::feed::domain::{
    FieldError, ImageInput, LifecycleEvent, PostDraft, PostId, PostPage, PostView, UploadedImage,
    UserId,
};
use crate::feed::guard;
use crate::feed::repository::{PostRepository, RepositoryError, UserRepository};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Validation failed, entered data is incorrect.")]
    Validation(Vec<FieldError>),

    #[error("No image provided.")]
    MissingAsset,

    #[error("Could not find post.")]
    NotFound,

    #[error("Not authorized!")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Post lifecycle: validate, authorise, persist, clean up assets, then notify.
///
/// Post and user writes are separate statements with no surrounding
/// transaction. If the second write fails the first one stays and the caller
/// gets a storage error. Events go out only after the post write succeeded.
pub struct PostService {
    posts: Arc<dyn PostRepository>,
    users: Arc<dyn UserRepository>,
    assets: Arc<dyn AssetStore>,
    broadcaster: Broadcaster,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        users: Arc<dyn UserRepository>,
        assets: Arc<dyn AssetStore>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            posts,
            users,
            assets,
            broadcaster,
        }
    }

    /// Pages are 1-indexed; anything below 1 is page 1. Past the end is an empty page.
    pub async fn list_posts(&self, page: u32, page_size: u32) -> FeedResult<PostPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = u64::from(page - 1) * u64::from(page_size);

        let total_items = self.posts.count().await?;
        let posts = self.posts.find_page(offset, page_size).await?;

        Ok(PostPage { posts, total_items })
    }

    pub async fn get_post(&self, id: &PostId) -> FeedResult<PostView> {
        self.posts
            .find_view_by_id(id)
            .await?
            .ok_or(FeedError::NotFound)
    }

    pub async fn create_post(
        &self,
        identity: &UserId,
        title: &str,
        content: &str,
        image: Option<UploadedImage>,
    ) -> FeedResult<PostView> {
        let draft = validated(title, content)?;
        let image = image.ok_or(FeedError::MissingAsset)?;
        let creator_name = self.creator_name(identity).await?;

        let image_url = self
            .assets
            .store(image)
            .await?
            .ok_or(FeedError::MissingAsset)?;

        let now = Utc::now().trunc_subsecs(6);
        let post = Post {
            id: PostId::generate(),
            title: draft.title,
            content: draft.content,
            image_url,
            creator: identity.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.posts.insert(&post).await {
            self.assets.delete(&post.image_url).await;
            return Err(e.into());
        }
        self.users.append_post(identity, &post.id).await?;

        let view = PostView::from_post(post, creator_name);
        self.broadcaster
            .publish(LifecycleEvent::Create(view.clone()));
        tracing::info!("Post {} created by {}", view.id, identity);

        Ok(view)
    }

    pub async fn update_post(
        &self,
        identity: &UserId,
        id: &PostId,
        title: &str,
        content: &str,
        image: ImageInput,
    ) -> FeedResult<PostView> {
        let draft = validated(title, content)?;
        if image.is_empty() {
            return Err(FeedError::MissingAsset);
        }

        let current = self.owned_post(identity, id).await?;
        let creator_name = self.creator_name(&current.creator).await?;

        let mut uploaded = None;
        if let Some(upload) = image.upload {
            uploaded = self.assets.store(upload).await?;
        }
        // Without a new file the post may only keep the image it already has
        let image_url = match &uploaded {
            Some(stored) => stored.clone(),
            None => {
                let url = image.existing_url.as_deref().map(str::trim).unwrap_or_default();
                if url != current.image_url {
                    if !url.is_empty() {
                        tracing::warn!("Rejected foreign image {} for post {}", url, id);
                    }
                    return Err(FeedError::MissingAsset);
                }
                current.image_url.clone()
            }
        };

        let updated = Post {
            title: draft.title,
            content: draft.content,
            image_url,
            updated_at: Utc::now().trunc_subsecs(6),
            ..current.clone()
        };

        if let Err(e) = self.posts.update(&updated).await {
            if let Some(stored) = &uploaded {
                self.assets.delete(stored).await;
            }
            return Err(match e {
                RepositoryError::NotFound(_) => FeedError::NotFound,
                other => other.into(),
            });
        }

        if updated.image_url != current.image_url {
            self.assets.delete(&current.image_url).await;
        }

        let view = PostView::from_post(updated, creator_name);
        self.broadcaster
            .publish(LifecycleEvent::Update(view.clone()));
        tracing::info!("Post {} updated by {}", view.id, identity);

        Ok(view)
    }

    pub async fn delete_post(&self, identity: &UserId, id: &PostId) -> FeedResult<()> {
        let post = self.owned_post(identity, id).await?;

        if !self.posts.delete(&post.id).await? {
            return Err(FeedError::NotFound);
        }
        if !self.users.remove_post(&post.creator, &post.id).await? {
            tracing::warn!(
                "Post {} was not referenced by its creator {}",
                post.id,
                post.creator
            );
        }
        self.assets.delete(&post.image_url).await;

        self.broadcaster
            .publish(LifecycleEvent::Delete(post.id.clone()));
        tracing::info!("Post {} deleted by {}", post.id, identity);

        Ok(())
    }

    /// Loads the stored post and checks that `identity` created it.
    async fn owned_post(&self, identity: &UserId, id: &PostId) -> FeedResult<Post> {
        let post = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(FeedError::NotFound)?;

        if !guard::can_mutate(identity, &post) {
            return Err(FeedError::Forbidden);
        }
        Ok(post)
    }

    async fn creator_name(&self, id: &UserId) -> FeedResult<String> {
        let user = self
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;
        Ok(user.name)
    }
}

fn validated(title: &str, content: &str) -> FeedResult<PostDraft> {
    let draft = PostDraft::new(title, content);
    let problems = draft.problems();
    if problems.is_empty() {
        Ok(draft)
    } else {
        Err(FeedError::Validation(problems))
    }
}
