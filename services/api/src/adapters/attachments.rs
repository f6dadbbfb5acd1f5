//! services/api/src/adapters/attachments.rs
//!
//! Staged profile-image uploads on the local filesystem. Each user gets their
//! own directory so an upload handle cannot reach another user's files.

use async_trait::async_trait;
use bytes::Bytes;
use cv_builder_core::domain::PendingImage;
use cv_builder_core::ports::{AttachmentReader, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct FsAttachmentStore {
    dir: PathBuf,
}

impl FsAttachmentStore {
    /// The upload area of `user_id` under `root`.
    pub fn for_user(root: &Path, user_id: Uuid) -> Self {
        Self {
            dir: root.join(user_id.to_string()),
        }
    }

    /// Writes an uploaded file and returns the handle the editor puts in the form.
    pub async fn stage(&self, name: &str, mime_type: &str, data: Bytes) -> PortResult<PendingImage> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to create upload dir: {}", e)))?;

        let upload_id = Uuid::new_v4();
        tokio::fs::write(self.path_of(upload_id), &data)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to store upload: {}", e)))?;
        info!(upload_id = %upload_id, size = data.len(), "Profile image staged");

        Ok(PendingImage {
            upload_id,
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
        })
    }

    fn path_of(&self, upload_id: Uuid) -> PathBuf {
        self.dir.join(upload_id.to_string())
    }
}

#[async_trait]
impl AttachmentReader for FsAttachmentStore {
    async fn read_pending(&self, image: &PendingImage) -> PortResult<Vec<u8>> {
        tokio::fs::read(self.path_of(image.upload_id))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    PortError::NotFound(format!("Upload {} not found", image.upload_id))
                }
                _ => PortError::Unexpected(format!("Failed to read upload: {}", e)),
            })
    }
}
