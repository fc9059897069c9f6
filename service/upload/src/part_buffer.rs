use domain_upload::{
    exception::{UploadException, UploadResult},
    model::{entity::UploadConfiguration, vo::Part},
};

/// Coalesces incoming chunks into parts of at least `min_part_size` bytes.
///
/// Every emitted part except possibly the last one reaches the minimum size,
/// and bytes leave in the order they arrived.
#[derive(Debug)]
pub struct PartBuffer {
    min_part_size: u64,
    max_part_size: Option<u64>,
    max_total_size: Option<u64>,
    pending: Option<Vec<u8>>,
    parts_emitted: u64,
    total_size: u64,
    ended: bool,
}

impl PartBuffer {
    pub fn new(min_part_size: u64, max_part_size: Option<u64>, max_total_size: Option<u64>) -> Self {
        Self {
            min_part_size,
            max_part_size,
            max_total_size,
            pending: None,
            parts_emitted: 0,
            total_size: 0,
            ended: false,
        }
    }

    pub fn from_config(config: &UploadConfiguration) -> Self {
        Self::new(config.min_part_size, config.max_part_size, config.max_total_size)
    }

    /// Feed one chunk, returning a part when one is ready.
    ///
    /// Fails once the bytes read exceed the maximum total size; nothing is
    /// emitted for the offending chunk.
    pub fn push(&mut self, chunk: Vec<u8>) -> UploadResult<Option<Part>> {
        self.total_size += chunk.len() as u64;
        if let Some(max_total_size) = self.max_total_size {
            if self.total_size > max_total_size {
                return Err(UploadException::TotalSizeExceeded {
                    total_size: self.total_size,
                    max_total_size,
                });
            }
        }
        if chunk.is_empty() {
            return Ok(None);
        }

        let payload = match self.pending.take() {
            Some(mut pending) => {
                pending.extend_from_slice(&chunk);
                if (pending.len() as u64) < self.min_part_size {
                    self.pending = Some(pending);
                    return Ok(None);
                }
                pending
            }
            None if (chunk.len() as u64) < self.min_part_size => {
                self.pending = Some(chunk);
                return Ok(None);
            }
            None => chunk,
        };
        Ok(Some(self.emit(payload)))
    }

    /// Mark the stream ended, flushing what is left as a final part.
    pub fn finish(&mut self) -> Option<Part> {
        self.ended = true;
        let pending = self.pending.take().filter(|pending| !pending.is_empty())?;
        Some(self.emit(pending))
    }

    /// Drop buffered bytes, used on abort.
    pub fn discard(&mut self) {
        self.pending = None;
    }

    fn emit(&mut self, payload: Vec<u8>) -> Part {
        if let Some(max_part_size) = self.max_part_size {
            if payload.len() as u64 > max_part_size {
                // Oversized chunks are not split.
                tracing::warn!(
                    "Part {} has {} bytes, over the maximum part size: {max_part_size}.",
                    self.parts_emitted + 1,
                    payload.len()
                );
            }
        }
        self.parts_emitted += 1;
        Part {
            number: self.parts_emitted,
            payload,
        }
    }

    pub fn parts_emitted(&self) -> u64 {
        self.parts_emitted
    }

    /// Bytes read from the source so far.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }
}
