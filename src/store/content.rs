//! Filesystem blob store for evidence content and attachments.
//!
//! Layout under the store root:
//!
//! ```text
//! <evidence_id>/<hash16>-<write_id>/content.json
//! <evidence_id>/<hash16>-<write_id>/attachments/<object_key>
//! ```
//!
//! Every write gets its own directory, even when the content reverts to an
//! earlier revision's. Cleaning up a failed write therefore never touches a
//! blob some revision still points at.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::core::error::{AppError, Result};

use super::{ContentUpload, EvidenceContentRepository};

const CONTENT_FILE: &str = "content.json";
const ATTACHMENTS_DIR: &str = "attachments";

/// Content store rooted at a local directory
pub struct FsContentStore {
    root: PathBuf,
    bucket_name: String,
}

impl FsContentStore {
    /// Create or open a content store
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let bucket_name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("evidence-content")
            .to_string();

        Ok(Self { root, bucket_name })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a location to its directory, refusing anything that could
    /// escape the store root
    fn location_dir(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location);
        let safe = !location.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !safe {
            return Err(AppError::Validation(format!(
                "invalid content location: {}",
                location
            )));
        }

        Ok(self.root.join(relative))
    }

    fn blob_path(&self, location: &str, attachment_key: Option<&str>) -> Result<PathBuf> {
        let dir = self.location_dir(location)?;
        match attachment_key {
            None => Ok(dir.join(CONTENT_FILE)),
            Some(key) => {
                if key.is_empty() || key.contains(&['/', '\\'][..]) || key == "." || key == ".." {
                    return Err(AppError::Validation(format!(
                        "invalid attachment key: {}",
                        key
                    )));
                }
                Ok(dir.join(ATTACHMENTS_DIR).join(key))
            }
        }
    }

    async fn write_upload(&self, dir: &Path, upload: &ContentUpload<'_>) -> Result<()> {
        fs::create_dir_all(dir).await?;

        let content = serde_json::to_vec(upload.content)?;
        fs::write(dir.join(CONTENT_FILE), content).await?;

        if !upload.attachments.is_empty() {
            let attachments_dir = dir.join(ATTACHMENTS_DIR);
            fs::create_dir_all(&attachments_dir).await?;

            for attachment in upload.attachments {
                fs::write(attachments_dir.join(&attachment.object_key), &attachment.data).await?;
            }
        }

        Ok(())
    }
}

/// Location for one write: `<evidence_id>/<first 16 hex chars of hash>-<write_id>`
pub fn revision_location(evidence_id: &str, content_hash: &str, write_id: &str) -> String {
    let prefix: String = content_hash
        .trim_start_matches("sha256:")
        .chars()
        .take(16)
        .collect();
    format!("{}/{}-{}", evidence_id, prefix, write_id)
}

#[async_trait]
impl EvidenceContentRepository for FsContentStore {
    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    async fn put_content(&self, upload: &ContentUpload<'_>) -> Result<String> {
        let location =
            revision_location(upload.evidence_id, upload.content_hash, upload.write_id);
        let dir = self.location_dir(&location)?;

        if fs::try_exists(&dir).await? {
            return Err(AppError::Storage(format!(
                "content location already in use: {}",
                location
            )));
        }

        if let Err(e) = self.write_upload(&dir, upload).await {
            // Leave nothing half-written behind
            let _ = fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        debug!(
            location = %location,
            attachments = upload.attachments.len(),
            "Stored evidence content"
        );
        Ok(location)
    }

    async fn get_evidence_content(
        &self,
        location: &str,
        attachment_key: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(location, attachment_key)?;

        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_content(&self, location: &str) -> Result<()> {
        let dir = self.location_dir(location)?;

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Drop the per-evidence directory once its last revision is gone
        if let Some(parent) = dir.parent() {
            if parent != self.root {
                let _ = fs::remove_dir(parent).await;
            }
        }

        debug!(location, "Deleted evidence content");
        Ok(())
    }
}
