//! Blob storage for uploaded photos and generated results.
//!
//! Every user owns at most one blob per [`MediaKind`]; writing a kind replaces the previous
//! blob. The filesystem store keeps them under `<root>/<external_id>/`.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Car,
    Wheel,
    Result,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Car => "car.jpg",
            Self::Wheel => "wheel.jpg",
            Self::Result => "result.jpg",
            Self::Video => "result.mp4",
        }
    }
}

/// Handle to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub owner: String,
    pub kind: MediaKind,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, owner: &str, kind: MediaKind, bytes: &[u8]) -> Result<MediaRef>;

    /// `None` when nothing is stored for the reference.
    async fn get(&self, media: &MediaRef) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing blob is not an error.
    async fn delete(&self, media: &MediaRef) -> Result<()>;
}

/// Stores blobs as plain files under a root directory.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, owner: &str) -> Result<PathBuf> {
        let safe = !owner.is_empty()
            && owner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(Error::InvariantViolation {
                message: format!("refusing media path for owner '{owner}'"),
            });
        }
        Ok(self.root.join(owner))
    }

    fn path(&self, media: &MediaRef) -> Result<PathBuf> {
        Ok(self.user_dir(&media.owner)?.join(media.kind.file_name()))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn put(&self, owner: &str, kind: MediaKind, bytes: &[u8]) -> Result<MediaRef> {
        let dir = self.user_dir(owner)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(kind.file_name()), bytes).await?;
        Ok(MediaRef {
            owner: owner.to_string(),
            kind,
        })
    }

    async fn get(&self, media: &MediaRef) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(media)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, media: &MediaRef) -> Result<()> {
        match tokio::fs::remove_file(self.path(media)?).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
