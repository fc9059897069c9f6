use std::{collections::HashMap, path::PathBuf};

use domain_upload::model::{
    entity::{
        UploadOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_PART_RETRIES, MIN_PART_SIZE_FLOOR,
    },
    vo::ByteStream,
};
use serde::*;

use crate::telemetry::TelemetryConfig;

#[derive(Default, Deserialize, Clone, Debug)]
pub struct UploaderConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Where the local object store keeps its files.
#[derive(Deserialize, Clone, Debug)]
pub struct BackendConfig {
    #[serde(default = "BackendConfig::default_root")]
    pub root: String,
    #[serde(default = "BackendConfig::default_progress_step")]
    pub progress_step: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            progress_step: Self::default_progress_step(),
        }
    }
}

impl BackendConfig {
    fn default_root() -> String {
        "object-store".to_string()
    }
    fn default_progress_step() -> usize {
        64 * 1024
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct UploadConfig {
    #[serde(default)]
    pub bucket: String,
    /// Falls back to the file name when uploading a file.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "UploadConfig::default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "UploadConfig::default_no_disk")]
    pub no_disk: bool,
    #[serde(default = "UploadConfig::default_max_part_retries")]
    pub max_part_retries: u32,
    /// Cap on retries across all parts, unlimited when absent.
    #[serde(default)]
    pub max_total_retries: Option<u32>,
    #[serde(default = "UploadConfig::default_min_part_size")]
    pub min_part_size: u64,
    #[serde(default)]
    pub max_part_size: Option<u64>,
    #[serde(default)]
    pub max_total_size: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: Default::default(),
            key: Default::default(),
            headers: Default::default(),
            concurrency: Self::default_concurrency(),
            no_disk: Self::default_no_disk(),
            max_part_retries: Self::default_max_part_retries(),
            max_total_retries: Default::default(),
            min_part_size: Self::default_min_part_size(),
            max_part_size: Default::default(),
            max_total_size: Default::default(),
        }
    }
}

impl UploadConfig {
    fn default_concurrency() -> usize {
        DEFAULT_CONCURRENCY
    }
    fn default_no_disk() -> bool {
        true
    }
    fn default_max_part_retries() -> u32 {
        DEFAULT_MAX_PART_RETRIES
    }
    fn default_min_part_size() -> u64 {
        MIN_PART_SIZE_FLOOR
    }

    /// Session options reading from `file`, or from `stream` when no file is given.
    pub fn options(&self, file: Option<PathBuf>, stream: Option<ByteStream>) -> UploadOptions {
        let key = self
            .key
            .clone()
            .or_else(|| {
                file.as_ref()
                    .and_then(|path| path.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        UploadOptions {
            bucket: self.bucket.clone(),
            key,
            stream,
            file,
            headers: self.headers.clone(),
            concurrency: self.concurrency,
            no_disk: self.no_disk,
            max_part_retries: self.max_part_retries,
            max_total_retries: self.max_total_retries,
            min_part_size: self.min_part_size,
            max_part_size: self.max_part_size,
            max_total_size: self.max_total_size,
        }
    }
}

/// The file to upload: the first argument that is neither a flag nor a
/// configuration file. `None`, or `-`, means stdin.
pub fn source_arg(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    args.into_iter()
        .find(|arg| !is_config_file(arg) && (arg == "-" || !arg.starts_with('-')))
        .filter(|arg| arg != "-")
        .map(PathBuf::from)
}

fn is_config_file(arg: &str) -> bool {
    arg.ends_with("yaml") || arg.ends_with("yml")
}

pub fn build_config() -> anyhow::Result<config::Config> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    for arg in args {
        if is_config_file(&arg) {
            config = config.add_source(
                config::File::from(std::path::Path::new(arg.as_str()))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
    }
    config = config.add_source(
        config::Environment::with_prefix("MPU")
            .separator("__")
            .try_parsing(true),
    );
    Ok(config.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn source_argument() {
        assert_eq!(source_arg(args(&[])), None);
        assert_eq!(source_arg(args(&["-"])), None);
        assert_eq!(source_arg(args(&["dev.yaml", "-"])), None);
        assert_eq!(
            source_arg(args(&["dev.yml", "--verbose", "data/file.bin"])),
            Some(PathBuf::from("data/file.bin"))
        );
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: UploaderConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "backend:\n  root: /tmp/store\nupload:\n  bucket: media\n  concurrency: 8\n  max_total_size: 1024\n  headers:\n    content-type: video/mp4\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.backend.root, "/tmp/store");
        assert_eq!(config.backend.progress_step, 64 * 1024);
        assert_eq!(config.upload.bucket, "media");
        assert_eq!(config.upload.concurrency, 8);
        assert_eq!(config.upload.max_total_size, Some(1024));
        assert_eq!(config.upload.max_part_retries, 2);
        assert_eq!(config.upload.max_total_retries, None);
        assert_eq!(config.upload.min_part_size, 5 * 1024 * 1024);
        assert_eq!(config.upload.headers["content-type"], "video/mp4");
        assert!(config.telemetry.enable);
    }

    #[test]
    fn key_defaults_to_file_name() {
        let upload = UploadConfig::default();
        let options = upload.options(Some(PathBuf::from("data/clip.mp4")), None);
        assert_eq!(options.key, "clip.mp4");
        assert!(options.stream.is_none());

        let upload = UploadConfig {
            key: Some("videos/clip.mp4".to_string()),
            ..Default::default()
        };
        let options = upload.options(Some(PathBuf::from("data/clip.mp4")), None);
        assert_eq!(options.key, "videos/clip.mp4");
    }
}
