// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use thiserror::Error;

use crate::db::models::{Post, User};
use crate::feed::domain::{PostId, PostView, UserId};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Post collection. Listing and single reads resolve the creator's name.
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn count(&self) -> Result<u64, RepositoryError>;

    /// Posts ordered newest first, skipping `offset` and returning at most `limit`.
    async fn find_page(&self, offset: u64, limit: u32) -> Result<Vec<PostView>, RepositoryError>;

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, RepositoryError>;

    async fn find_view_by_id(&self, id: &PostId) -> Result<Option<PostView>, RepositoryError>;

    async fn insert(&self, post: &Post) -> Result<(), RepositoryError>;

    /// Overwrites title, content, image and `updated_at`. Last write wins.
    async fn update(&self, post: &Post) -> Result<(), RepositoryError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: &PostId) -> Result<bool, RepositoryError>;
}

/// User records and their ordered post references.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Post references in the order they were appended.
    async fn post_ids(&self, id: &UserId) -> Result<Vec<PostId>, RepositoryError>;

    async fn append_post(&self, id: &UserId, post: &PostId) -> Result<(), RepositoryError>;

    /// Returns false when the reference was not present.
    async fn remove_post(&self, id: &UserId, post: &PostId) -> Result<bool, RepositoryError>;
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.image_url, p.creator_id, p.created_at, p.updated_at";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: PostId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        content: row.get(2)?,
        image_url: row.get(3)?,
        creator: UserId::new(row.get::<_, String>(4)?),
        created_at: parse_timestamp(row, 5)?,
        updated_at: parse_timestamp(row, 6)?,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<PostView> {
    let post = post_from_row(row)?;
    let creator_name: String = row.get(7)?;
    Ok(PostView::from_post(post, creator_name))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get::<_, String>(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// SQLite implementation
pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn count(&self) -> Result<u64, RepositoryError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn find_page(&self, offset: u64, limit: u32) -> Result<Vec<PostView>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS}, u.name
             FROM posts p
             JOIN users u ON u.id = p.creator_id
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;

        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let posts = stmt
            .query_map(params![limit, offset], view_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
                params![id.as_str()],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn find_view_by_id(&self, id: &PostId) -> Result<Option<PostView>, RepositoryError> {
        let conn = self.pool.get()?;
        let view = conn
            .query_row(
                &format!(
                    "SELECT {POST_COLUMNS}, u.name
                     FROM posts p
                     JOIN users u ON u.id = p.creator_id
                     WHERE p.id = ?1"
                ),
                params![id.as_str()],
                view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    async fn insert(&self, post: &Post) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, title, content, image_url, creator_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                post.id.as_str(),
                post.title,
                post.content,
                post.image_url,
                post.creator.as_str(),
                format_timestamp(&post.created_at),
                format_timestamp(&post.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn update(&self, post: &Post) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE posts SET title = ?2, content = ?3, image_url = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                post.id.as_str(),
                post.title,
                post.content,
                post.image_url,
                format_timestamp(&post.updated_at),
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("post {}", post.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &PostId) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let id = UserId::generate();

        let inserted = conn.execute(
            "INSERT INTO users (id, email, name, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), email, name, password_hash],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(RepositoryError::Conflict(format!("email {email}")));
            }
            Err(e) => return Err(e.into()),
        }

        let user = conn.query_row(
            "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
            params![id.as_str()],
            user_from_row,
        )?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
                params![id.as_str()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn post_ids(&self, id: &UserId) -> Result<Vec<PostId>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT post_id FROM user_posts WHERE user_id = ?1 ORDER BY position")?;
        let ids = stmt
            .query_map(params![id.as_str()], |row| {
                row.get::<_, String>(0).map(PostId::new)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    async fn append_post(&self, id: &UserId, post: &PostId) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "INSERT INTO user_posts (user_id, post_id)
             SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)",
            params![id.as_str(), post.as_str()],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn remove_post(&self, id: &UserId, post: &PostId) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM user_posts WHERE user_id = ?1 AND post_id = ?2",
            params![id.as_str(), post.as_str()],
        )?;
        Ok(rows > 0)
    }
}
