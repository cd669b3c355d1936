pub mod assets;
pub mod broadcaster;
pub mod domain;
pub mod guard;
pub mod repository;
pub mod service;

pub use assets::{AssetStore, FsAssetStore};
pub use broadcaster::{Broadcaster, POSTS_TOPIC};
pub use domain::{ImageInput, LifecycleEvent, PostId, PostView, UploadedImage, UserId};
pub use repository::{
    PostRepository, RepositoryError, SqlitePostRepository, SqliteUserRepository, UserRepository,
};
pub use service::{FeedError, PostService};
