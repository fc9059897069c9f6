use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::vo::{CompletedPart, PartProgressReporter, UploadTarget};

/// # Multipart object storage backend
///
/// The four operations of the multipart upload protocol. Every call after
/// `create_upload` carries the upload id it returned.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Start a multipart upload, returning its upload id.
    async fn create_upload(
        &self,
        target: &UploadTarget,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<String>;

    /// Upload one part, returning the ETag the backend assigned to it.
    ///
    /// Transfer progress may be reported through `progress` while sending.
    async fn upload_part(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        part_number: u64,
        payload: &[u8],
        progress: &PartProgressReporter,
    ) -> anyhow::Result<String>;

    /// Assemble the object from parts ordered by part number.
    async fn complete_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()>;

    /// Discard the upload and every part stored for it.
    async fn abort_upload(&self, target: &UploadTarget, upload_id: &str) -> anyhow::Result<()>;
}
