use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use domain_upload::{
    model::vo::{
        CompletedPart, EventSender, Part, PartProgressReporter, UploadEvent, UploadTarget,
    },
    service::MultipartBackend,
};
use typed_builder::TypedBuilder;

/// Shared flag telling upload tasks the session is aborting.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retries left for the whole upload, shared by every part.
///
/// Without a cap every acquire succeeds.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    remaining: Option<Arc<AtomicU32>>,
}

impl RetryBudget {
    pub fn new(max: Option<u32>) -> Self {
        Self {
            remaining: max.map(|max| Arc::new(AtomicU32::new(max))),
        }
    }

    /// Take one retry, false when none is left.
    pub fn try_acquire(&self) -> bool {
        match &self.remaining {
            Some(remaining) => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok(),
            None => true,
        }
    }

    #[cfg(test)]
    fn remaining(&self) -> Option<u32> {
        self.remaining.as_ref().map(|remaining| remaining.load(Ordering::SeqCst))
    }
}

/// How the upload of one part ended.
#[derive(Debug)]
pub enum PartOutcome {
    Uploaded {
        completed: CompletedPart,
        size: u64,
        retries: u32,
    },
    /// Dropped because the session aborted, or nothing to send.
    Cancelled { part_number: u64 },
    Failed {
        part_number: u64,
        retries: u32,
        /// The upload-wide retry budget ran out before the per-part one.
        budget_exhausted: bool,
        source: anyhow::Error,
    },
}

/// Uploads single parts under one upload id, retrying failed attempts.
#[derive(TypedBuilder)]
pub struct PartUploader {
    backend: Arc<dyn MultipartBackend>,
    target: UploadTarget,
    #[builder(setter(into))]
    upload_id: String,
    #[builder(default = 2)]
    max_part_retries: u32,
    retry_budget: RetryBudget,
    #[builder(default)]
    abort: AbortSignal,
    #[builder(default)]
    events: EventSender,
}

impl PartUploader {
    pub async fn upload(&self, part: Part) -> PartOutcome {
        let part_number = part.number;
        if part.payload.is_empty() {
            return PartOutcome::Cancelled { part_number };
        }
        let progress = PartProgressReporter::new(part_number, self.events.clone());
        let mut retries = 0;
        loop {
            if self.abort.is_aborted() {
                tracing::debug!("Not sending part {part_number}, the upload is aborted.");
                return PartOutcome::Cancelled { part_number };
            }
            self.events.emit(UploadEvent::PartUploading { part_number });
            let result = self
                .backend
                .upload_part(
                    &self.target,
                    &self.upload_id,
                    part_number,
                    &part.payload,
                    &progress,
                )
                .await;
            if self.abort.is_aborted() {
                tracing::debug!("Dropping result of part {part_number}, the upload is aborted.");
                return PartOutcome::Cancelled { part_number };
            }

            let source = match result {
                Ok(e_tag) => {
                    tracing::debug!("Part {part_number} uploaded with ETag: {e_tag}.");
                    return PartOutcome::Uploaded {
                        completed: CompletedPart { e_tag, part_number },
                        size: part.size(),
                        retries,
                    };
                }
                Err(e) => e,
            };
            if retries >= self.max_part_retries {
                return PartOutcome::Failed {
                    part_number,
                    retries,
                    budget_exhausted: false,
                    source,
                };
            }
            if !self.retry_budget.try_acquire() {
                return PartOutcome::Failed {
                    part_number,
                    retries,
                    budget_exhausted: true,
                    source,
                };
            }
            retries += 1;
            tracing::warn!("Retrying part {part_number} ({retries}) after error: {source:#}");
            self.events.emit(UploadEvent::PartRetried {
                part_number,
                retry: retries,
            });
            // Let an abort issued meanwhile land before the next attempt.
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use domain_upload::mock::MockMultipartBackend;

    use super::*;

    fn target() -> UploadTarget {
        UploadTarget {
            bucket: "bucket".to_string(),
            key: "key".to_string(),
        }
    }

    fn part(number: u64) -> Part {
        Part {
            number,
            payload: vec![7; 16],
        }
    }

    fn uploader(
        backend: MockMultipartBackend,
        budget: Option<u32>,
        abort: AbortSignal,
        events: EventSender,
    ) -> PartUploader {
        PartUploader::builder()
            .backend(Arc::new(backend))
            .target(target())
            .upload_id("upload-1")
            .max_part_retries(2)
            .retry_budget(RetryBudget::new(budget))
            .abort(abort)
            .events(events)
            .build()
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut backend = MockMultipartBackend::new();
        let counter = calls.clone();
        backend
            .expect_upload_part()
            .withf(|_, upload_id, part_number, payload, _| {
                upload_id == "upload-1" && *part_number == 4 && payload.len() == 16
            })
            .times(3)
            .returning(move |_, _, _, _, _| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok("etag-4".to_string())
                }
            });
        let (events, receiver) = EventSender::channel();

        let outcome = uploader(backend, Some(6), AbortSignal::new(), events).upload(part(4)).await;

        match outcome {
            PartOutcome::Uploaded {
                completed,
                size,
                retries,
            } => {
                assert_eq!(completed.e_tag, "etag-4");
                assert_eq!(completed.part_number, 4);
                assert_eq!(size, 16);
                assert_eq!(retries, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let retried = receiver
            .drain()
            .filter(|e| matches!(e, UploadEvent::PartRetried { .. }))
            .count();
        assert_eq!(retried, 2);
    }

    #[tokio::test]
    async fn fails_after_per_part_retries() {
        let mut backend = MockMultipartBackend::new();
        backend
            .expect_upload_part()
            .times(3)
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("service unavailable")));
        let budget = RetryBudget::new(Some(6));
        let uploader = PartUploader::builder()
            .backend(Arc::new(backend))
            .target(target())
            .upload_id("upload-1")
            .retry_budget(budget.clone())
            .build();

        let outcome = uploader.upload(part(1)).await;

        assert!(matches!(
            outcome,
            PartOutcome::Failed {
                part_number: 1,
                retries: 2,
                budget_exhausted: false,
                ..
            }
        ));
        assert_eq!(budget.remaining(), Some(4));
    }

    #[tokio::test]
    async fn upload_wide_budget_caps_retries() {
        let mut backend = MockMultipartBackend::new();
        backend
            .expect_upload_part()
            .times(2)
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("slow down")));

        let outcome =
            uploader(backend, Some(1), AbortSignal::new(), EventSender::disabled()).upload(part(2)).await;

        assert!(matches!(
            outcome,
            PartOutcome::Failed {
                retries: 1,
                budget_exhausted: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn abort_mid_retry_drops_the_part() {
        let abort = AbortSignal::new();
        let trigger = abort.clone();
        let mut backend = MockMultipartBackend::new();
        backend.expect_upload_part().times(1).returning(move |_, _, _, _, _| {
            trigger.trigger();
            Err(anyhow::anyhow!("broken pipe"))
        });

        let outcome = uploader(backend, Some(6), abort, EventSender::disabled()).upload(part(3)).await;

        assert!(matches!(outcome, PartOutcome::Cancelled { part_number: 3 }));
    }

    #[tokio::test]
    async fn empty_or_aborted_parts_skip_the_backend() {
        let abort = AbortSignal::new();
        let uploader = uploader(
            MockMultipartBackend::new(),
            Some(6),
            abort.clone(),
            EventSender::disabled(),
        );

        let empty = Part {
            number: 1,
            payload: vec![],
        };
        assert!(matches!(uploader.upload(empty).await, PartOutcome::Cancelled { .. }));

        abort.trigger();
        assert!(matches!(uploader.upload(part(2)).await, PartOutcome::Cancelled { .. }));
    }

    #[test]
    fn retry_budget_never_underflows() {
        let budget = RetryBudget::new(Some(2));
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.remaining(), Some(0));
    }

    #[test]
    fn uncapped_budget_always_grants() {
        let budget = RetryBudget::new(None);
        assert!((0..1000).all(|_| budget.try_acquire()));
        assert_eq!(budget.remaining(), None);
    }

    #[tokio::test]
    async fn abort_between_attempts_stops_the_retry() {
        let mut backend = MockMultipartBackend::new();
        backend
            .expect_upload_part()
            .times(1)
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("connection reset")));
        let abort = AbortSignal::new();
        let (events, receiver) = EventSender::channel();
        let uploader = uploader(backend, None, abort.clone(), events);
        let upload = tokio::spawn(async move { uploader.upload(part(5)).await });

        // The first attempt has failed and the retry is about to go out.
        while !matches!(
            receiver.recv_async().await.unwrap(),
            UploadEvent::PartRetried { part_number: 5, .. }
        ) {}
        abort.trigger();

        let outcome = upload.await.unwrap();
        assert!(matches!(outcome, PartOutcome::Cancelled { part_number: 5 }));
        let attempts = receiver
            .drain()
            .filter(|e| matches!(e, UploadEvent::PartUploading { .. }))
            .count();
        assert_eq!(attempts, 0);
    }
}
