use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use domain_upload::{
    model::vo::{CompletedPart, PartProgressReporter, UploadTarget},
    service::MultipartBackend,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Object store keeping objects as files under `root/<bucket>/<key>`.
///
/// Uploads in progress live in `root/.multipart/<upload id>/`, one file per
/// part next to a manifest of the target and the create headers.
#[derive(TypedBuilder, Clone, Debug)]
pub struct LocalMultipartBackend {
    #[builder(default = "object-store".into(), setter(into))]
    root: PathBuf,
    /// Bytes written between two progress reports.
    #[builder(default = 64 * 1024)]
    progress_step: usize,
}

#[derive(Serialize, Deserialize)]
struct UploadManifest {
    bucket: String,
    key: String,
    headers: HashMap<String, String>,
}

impl LocalMultipartBackend {
    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(format!(".multipart/{upload_id}"))
    }

    fn manifest_path(&self, upload_id: &str) -> PathBuf {
        self.upload_dir(upload_id).join("manifest.json")
    }

    fn part_path(&self, upload_id: &str, part_number: u64) -> PathBuf {
        self.upload_dir(upload_id).join(part_number.to_string())
    }

    fn object_path(&self, target: &UploadTarget) -> anyhow::Result<PathBuf> {
        for segment in [&target.bucket, &target.key] {
            let escapes = Path::new(segment)
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                bail!("Object path: {target} leaves the store root.");
            }
        }
        Ok(self.root.join(&target.bucket).join(&target.key))
    }

    /// Load the manifest of an upload, checking it belongs to `target`.
    async fn manifest(&self, target: &UploadTarget, upload_id: &str) -> anyhow::Result<UploadManifest> {
        let path = self.manifest_path(upload_id);
        if !tokio::fs::try_exists(&path).await? {
            bail!("Upload id: {upload_id} doesn't exist.");
        }
        let manifest: UploadManifest = serde_json::from_slice(&tokio::fs::read(&path).await?)?;
        if manifest.bucket != target.bucket || manifest.key != target.key {
            bail!(
                "Upload id: {upload_id} belongs to {}/{}, not {target}.",
                manifest.bucket,
                manifest.key
            );
        }
        Ok(manifest)
    }
}

#[async_trait]
impl MultipartBackend for LocalMultipartBackend {
    async fn create_upload(
        &self,
        target: &UploadTarget,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<String> {
        self.object_path(target)?;
        let upload_id = Uuid::new_v4().to_string();
        let manifest = UploadManifest {
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            headers: headers.clone(),
        };
        tokio::fs::create_dir_all(self.upload_dir(&upload_id)).await?;
        tokio::fs::write(self.manifest_path(&upload_id), serde_json::to_vec(&manifest)?).await?;
        tracing::debug!("Created upload {upload_id} for {target}.");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        part_number: u64,
        payload: &[u8],
        progress: &PartProgressReporter,
    ) -> anyhow::Result<String> {
        self.manifest(target, upload_id).await?;
        if part_number == 0 {
            bail!("Part numbers start at 1.");
        }
        let total = payload.len() as u64;
        let mut file = tokio::fs::File::create(self.part_path(upload_id, part_number)).await?;
        let mut loaded = 0;
        for slice in payload.chunks(self.progress_step.max(1)) {
            file.write_all(slice).await?;
            loaded += slice.len() as u64;
            progress.report(loaded, total);
        }
        file.flush().await?;
        Ok(blake3::hash(payload).to_string())
    }

    async fn complete_upload(
        &self,
        target: &UploadTarget,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> anyhow::Result<()> {
        self.manifest(target, upload_id).await?;
        if parts.is_empty() {
            bail!("Upload id: {upload_id} can't complete without parts.");
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            bail!("Parts of upload id: {upload_id} must be in ascending order.");
        }

        let assembling = self.upload_dir(upload_id).join("object");
        let mut object = tokio::fs::File::create(&assembling).await?;
        for part in parts {
            let content = tokio::fs::read(self.part_path(upload_id, part.part_number))
                .await
                .map_err(|e| anyhow!("Part {} of upload id: {upload_id}: {e}", part.part_number))?;
            let e_tag = blake3::hash(&content).to_string();
            if e_tag != part.e_tag {
                bail!(
                    "ETag of part {} doesn't match, expected: {}, stored: {e_tag}.",
                    part.part_number,
                    part.e_tag
                );
            }
            object.write_all(&content).await?;
        }
        object.flush().await?;
        drop(object);

        let path = self.object_path(target)?;
        tokio::fs::create_dir_all(
            path.parent().ok_or(anyhow!("path: {path:?} doesn't has parent."))?,
        )
        .await?;
        tokio::fs::rename(&assembling, &path).await?;
        tokio::fs::remove_dir_all(self.upload_dir(upload_id)).await?;
        tracing::debug!("Completed upload {upload_id} into {path:?}.");
        Ok(())
    }

    async fn abort_upload(&self, target: &UploadTarget, upload_id: &str) -> anyhow::Result<()> {
        self.manifest(target, upload_id).await?;
        tokio::fs::remove_dir_all(self.upload_dir(upload_id)).await?;
        tracing::debug!("Aborted upload {upload_id} for {target}.");
        Ok(())
    }
}
