use serde::{Deserialize, Serialize};

/// Where the uploaded object lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { bucket, key } = self;
        write!(f, "{bucket}/{key}")
    }
}
