use std::path::PathBuf;

pub type UploadResult<T> = Result<T, UploadException>;

#[derive(Debug, thiserror::Error)]
pub enum UploadException {
    #[error("The object key must be defined.")]
    MissingObjectKey,

    #[error("Either a stream or a file must be passed.")]
    MissingSource,

    #[error("A stream and a file cannot be passed together.")]
    ConflictedSource,

    #[error("Minimum part size: {min_part_size} is below the backend floor: {floor}.")]
    PartSizeBelowFloor { min_part_size: u64, floor: u64 },

    #[error(
        "Maximum part size: {max_part_size} must not be less than minimum part size: {min_part_size}."
    )]
    InvalidPartSizeRange {
        min_part_size: u64,
        max_part_size: u64,
    },

    #[error("Concurrency must be at least 1.")]
    InvalidConcurrency,

    #[error("File does not exist: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Source stream failed: {source}")]
    SourceFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("Source is empty, no need to upload.")]
    EmptySource,

    #[error("Total upload size: {total_size} exceeded the limit: {max_total_size}.")]
    TotalSizeExceeded { total_size: u64, max_total_size: u64 },

    #[error("Failed to create multipart upload: {source}")]
    CreateFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("Part {part_number} failed after {retries} retries: {source}")]
    PartUploadFailed {
        part_number: u64,
        retries: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Part {part_number} failed and the upload retry budget: {max_total_retries} is used up: {source}")]
    RetryBudgetExhausted {
        part_number: u64,
        max_total_retries: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to complete multipart upload: {upload_id}: {source}")]
    CompleteFailed {
        upload_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Upload was aborted by request.")]
    Aborted,

    #[error("Upload internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl UploadException {
    /// Errors raised while validating options, before any session exists.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            UploadException::MissingObjectKey
                | UploadException::MissingSource
                | UploadException::ConflictedSource
                | UploadException::PartSizeBelowFloor { .. }
                | UploadException::InvalidPartSizeRange { .. }
                | UploadException::InvalidConcurrency
        )
    }
}

impl From<anyhow::Error> for UploadException {
    fn from(e: anyhow::Error) -> Self {
        UploadException::InternalError { source: e }
    }
}
