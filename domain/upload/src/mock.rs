use std::collections::HashMap;

use async_trait::async_trait;
use mockall::mock;

use crate::{
    model::vo::{CompletedPart, PartProgressReporter, UploadTarget},
    service::MultipartBackend,
};

mock! {
    pub MultipartBackend {}
    #[async_trait]
    impl MultipartBackend for MultipartBackend {
        async fn create_upload(
            &self,
            target: &UploadTarget,
            headers: &HashMap<String, String>,
        ) -> anyhow::Result<String>;
        async fn upload_part(
            &self,
            target: &UploadTarget,
            upload_id: &str,
            part_number: u64,
            payload: &[u8],
            progress: &PartProgressReporter,
        ) -> anyhow::Result<String>;
        async fn complete_upload(
            &self,
            target: &UploadTarget,
            upload_id: &str,
            parts: &[CompletedPart],
        ) -> anyhow::Result<()>;
        async fn abort_upload(&self, target: &UploadTarget, upload_id: &str) -> anyhow::Result<()>;
    }
}
