use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::feed::{
    Broadcaster, FsAssetStore, PostService, SqlitePostRepository, SqliteUserRepository,
    UserRepository,
};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub posts: Arc<PostService>,
    pub users: Arc<dyn UserRepository>,
    pub assets: Arc<FsAssetStore>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    /// Wires repositories, asset store and broadcaster around one pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let broadcaster = Broadcaster::new(config.feed.broadcast_capacity);
        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db.clone()));
        let assets = Arc::new(FsAssetStore::new(
            config.images_path(),
            config.storage.public_prefix.clone(),
        ));
        let posts = Arc::new(PostService::new(
            Arc::new(SqlitePostRepository::new(db.clone())),
            users.clone(),
            assets.clone(),
            broadcaster.clone(),
        ));

        Self {
            db,
            config,
            posts,
            users,
            assets,
            broadcaster,
        }
    }
}
