use serde::{Deserialize, Serialize};

/// Progress of the whole upload after a part was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub part: u64,
    pub part_size: u64,
    pub total_written: u64,
    pub total_size: u64,
    /// Zero until the source has ended, the final size is unknown before.
    pub total_percent: f64,
}

/// Signals emitted by an upload session for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UploadEvent {
    UploadIdAcquired {
        upload_id: String,
    },
    /// Emitted for every attempt, retries included.
    PartUploading {
        part_number: u64,
    },
    PartRetried {
        part_number: u64,
        retry: u32,
    },
    PartUploaded {
        part_number: u64,
    },
    /// Transfer progress relayed from the backend transport.
    PartProgress {
        part_number: u64,
        loaded: u64,
        total: u64,
    },
    Progress(UploadProgress),
    TotalSizeExceeded {
        total_size: u64,
        max_total_size: u64,
    },
    Completing {
        upload_id: String,
    },
    Completed {
        upload_id: String,
    },
    Aborting {
        upload_id: Option<String>,
    },
    Aborted {
        upload_id: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Sending half of the event side channel.
///
/// Disabled senders drop every event, so nothing piles up when nobody listens.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    sender: Option<flume::Sender<UploadEvent>>,
}

impl EventSender {
    pub fn channel() -> (Self, flume::Receiver<UploadEvent>) {
        let (sender, receiver) = flume::unbounded();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: UploadEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody observes anymore.
            let _ = sender.send(event);
        }
    }
}

/// Handed to the backend for one part upload call.
#[derive(Debug, Clone)]
pub struct PartProgressReporter {
    part_number: u64,
    events: EventSender,
}

impl PartProgressReporter {
    pub fn new(part_number: u64, events: EventSender) -> Self {
        Self {
            part_number,
            events,
        }
    }

    /// Report `loaded` of `total` payload bytes sent so far.
    pub fn report(&self, loaded: u64, total: u64) {
        self.events.emit(UploadEvent::PartProgress {
            part_number: self.part_number,
            loaded,
            total,
        });
    }
}
