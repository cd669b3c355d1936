use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::feed::domain::UploadedImage;

const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpg", "image/jpeg"];

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image file lifecycle. References returned by `store` are what posts keep in `imageUrl`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Returns `Ok(None)` when the upload is not an accepted image type.
    async fn store(&self, upload: UploadedImage) -> Result<Option<String>, AssetError>;

    /// Best-effort removal. Never fails: a missing file is fine, other errors are logged.
    async fn delete(&self, asset_ref: &str);
}

pub fn is_accepted_image(content_type: &str) -> bool {
    ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| content_type.eq_ignore_ascii_case(accepted))
}

/// Stores images as files under a root directory served at `/<prefix>/...`.
pub struct FsAssetStore {
    root: PathBuf,
    prefix: String,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Maps an asset reference back to a file under the root. Anything that
    /// would escape the root, or lacks our prefix, maps to nothing.
    pub fn resolve(&self, asset_ref: &str) -> Option<PathBuf> {
        let relative = asset_ref
            .trim_start_matches('/')
            .strip_prefix(&self.prefix)?
            .strip_prefix('/')?;
        let relative = Path::new(relative);

        let mut components = relative.components();
        let only_normal = components.all(|c| matches!(c, Component::Normal(_)));
        if !only_normal || relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn unique_name(original: &str) -> String {
        let base = Path::new(original)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let sanitized: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
        let salt = &uuid::Uuid::now_v7().simple().to_string()[24..];
        format!("{stamp}-{salt}-{sanitized}")
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store(&self, upload: UploadedImage) -> Result<Option<String>, AssetError> {
        if !is_accepted_image(&upload.content_type) {
            tracing::debug!(
                "Rejected upload {} with content type {}",
                upload.file_name,
                upload.content_type
            );
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let name = Self::unique_name(&upload.file_name);
        tokio::fs::write(self.root.join(&name), &upload.data).await?;

        Ok(Some(format!("{}/{}", self.prefix, name)))
    }

    async fn delete(&self, asset_ref: &str) {
        let Some(path) = self.resolve(asset_ref) else {
            tracing::warn!("Refusing to delete asset outside the image root: {}", asset_ref);
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Deleted asset {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete asset {}: {}", path.display(), e),
        }
    }
}
