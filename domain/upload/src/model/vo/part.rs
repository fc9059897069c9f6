use serde::{Deserialize, Serialize};

/// A contiguous, numbered slice of the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Part {
    /// 1-based, assigned in emission order.
    pub number: u64,
    pub payload: Vec<u8>,
}

impl Part {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("number", &self.number)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// A part acknowledged by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompletedPart {
    pub e_tag: String,
    pub part_number: u64,
}

/// Result of a finished upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub upload_id: String,
    /// Ascending by part number.
    pub parts: Vec<CompletedPart>,
    pub total_written: u64,
    pub total_size: u64,
}
