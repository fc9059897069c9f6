use std::{path::PathBuf, sync::Arc};

use anyhow::anyhow;
use domain_upload::{
    command::ControlCommand,
    exception::{UploadException, UploadResult},
    model::{
        entity::{SessionState, UploadConfiguration, UploadOptions},
        vo::{
            ByteStream, CompletedPart, CompletedUpload, EventSender, Part, UploadEvent,
            UploadProgress, UploadSource,
        },
    },
    service::MultipartBackend,
};
use futures::StreamExt;
use tokio::task::JoinError;
use tracing::Instrument;

use crate::{
    concurrency::ConcurrencyQueue,
    part_buffer::PartBuffer,
    part_uploader::{AbortSignal, PartOutcome, PartUploader, RetryBudget},
    pending::PendingQueue,
    source::open_file,
};

/// Handle to pause, resume or abort a running session.
#[derive(Debug, Clone)]
pub struct UploadController {
    sender: flume::Sender<ControlCommand>,
}

impl UploadController {
    pub fn pause(&self) {
        self.send(ControlCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(ControlCommand::Resume);
    }

    pub fn abort(&self) {
        self.send(ControlCommand::Abort);
    }

    fn send(&self, command: ControlCommand) {
        // The session keeps a sender itself, so this only fails once it is gone.
        if self.sender.send(command).is_err() {
            tracing::debug!("Upload session already finished, ignoring {command:?}.");
        }
    }
}

/// One multipart upload, from acquiring the upload id to complete or abort.
///
/// All session state is owned by the task running [`UploadSession::run`];
/// part uploads run as separate tasks and only report their outcome back.
pub struct UploadSession {
    config: UploadConfiguration,
    backend: Arc<dyn MultipartBackend>,
    state: SessionState,
    upload_id: Option<String>,
    source: Option<ByteStream>,
    file: Option<PathBuf>,
    buffer: PartBuffer,
    pending: PendingQueue,
    queue: ConcurrencyQueue<Part, PartOutcome>,
    uploader: Option<Arc<PartUploader>>,
    parts: Vec<CompletedPart>,
    total_written: u64,
    abort: AbortSignal,
    retry_budget: RetryBudget,
    events: EventSender,
    control_sender: flume::Sender<ControlCommand>,
    control: flume::Receiver<ControlCommand>,
}

impl UploadSession {
    /// Validate the options, failing without touching the backend.
    pub fn new(options: UploadOptions, backend: Arc<dyn MultipartBackend>) -> UploadResult<Self> {
        let (config, source) = options.validate()?;
        let (source, file) = match source {
            UploadSource::Stream(stream) => (Some(stream), None),
            UploadSource::File(path) => (None, Some(path)),
        };
        let (control_sender, control) = flume::unbounded();
        Ok(Self {
            buffer: PartBuffer::from_config(&config),
            queue: ConcurrencyQueue::new(config.concurrency),
            retry_budget: RetryBudget::new(config.max_total_retries),
            config,
            backend,
            state: SessionState::Initializing,
            upload_id: None,
            source,
            file,
            pending: PendingQueue::new(),
            uploader: None,
            parts: vec![],
            total_written: 0,
            abort: AbortSignal::new(),
            events: EventSender::disabled(),
            control_sender,
            control,
        })
    }

    pub fn controller(&self) -> UploadController {
        UploadController {
            sender: self.control_sender.clone(),
        }
    }

    /// Receive the session's events. Subscribing again replaces the channel.
    pub fn subscribe(&mut self) -> flume::Receiver<UploadEvent> {
        let (events, receiver) = EventSender::channel();
        self.events = events;
        receiver
    }

    /// Drive the upload to its end.
    ///
    /// Any failure aborts the upload on the backend before it is returned.
    pub async fn run(mut self) -> UploadResult<CompletedUpload> {
        tracing::debug!(
            "Starting multipart upload to {} (concurrency: {}, no_disk: {}).",
            self.config.target,
            self.config.concurrency,
            self.config.no_disk
        );
        match self.drive().await {
            Ok(completed) => Ok(completed),
            Err(reason) => Err(self.abort(reason).await),
        }
    }

    async fn drive(&mut self) -> UploadResult<CompletedUpload> {
        let upload_id = self.initialize().await?;
        self.activate(upload_id).await?;
        loop {
            self.dispatch();
            if self.buffer.is_ended() && self.queue.is_drained() {
                return self.complete().await;
            }
            let reading = self.source.is_some() && !self.buffer.is_ended();
            let uploading = self.queue.running() > 0;
            tokio::select! {
                biased;
                Ok(command) = self.control.recv_async() => self.on_command(command)?,
                Some(finished) = self.queue.next_finished(), if uploading => {
                    self.on_part_finished(finished)?
                }
                chunk = next_chunk(&mut self.source), if reading => self.on_chunk(chunk)?,
            }
        }
    }

    /// Create the upload, reading an already open stream meanwhile.
    async fn initialize(&mut self) -> UploadResult<String> {
        let backend = self.backend.clone();
        let target = self.config.target.clone();
        let headers = self.config.create_headers();
        let create = async move { backend.create_upload(&target, &headers).await };
        tokio::pin!(create);

        // A failure seen before the id exists is raised once the id is known,
        // so the abort call can clean up on the backend.
        let mut failure = None;
        let created = loop {
            let reading = failure.is_none() && self.source.is_some() && !self.buffer.is_ended();
            tokio::select! {
                biased;
                Ok(command) = self.control.recv_async() => {
                    if let Err(e) = self.on_command(command) {
                        failure.get_or_insert(e);
                    }
                }
                created = &mut create => break created,
                chunk = next_chunk(&mut self.source), if reading => {
                    if let Err(e) = self.on_chunk(chunk) {
                        failure.get_or_insert(e);
                    }
                }
            }
        };
        let upload_id = created.map_err(|source| UploadException::CreateFailed { source })?;
        tracing::debug!("Acquired upload id: {upload_id} for {}.", self.config.target);
        self.upload_id = Some(upload_id.clone());
        self.events.emit(UploadEvent::UploadIdAcquired {
            upload_id: upload_id.clone(),
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(upload_id),
        }
    }

    async fn activate(&mut self, upload_id: String) -> UploadResult<()> {
        self.state = SessionState::Active;
        self.uploader = Some(Arc::new(
            PartUploader::builder()
                .backend(self.backend.clone())
                .target(self.config.target.clone())
                .upload_id(upload_id)
                .max_part_retries(self.config.max_part_retries)
                .retry_budget(self.retry_budget.clone())
                .abort(self.abort.clone())
                .events(self.events.clone())
                .build(),
        ));
        for part in self.pending.release() {
            self.queue.push(part);
        }
        if let Some(path) = self.file.take() {
            tracing::debug!("Reading upload source from file: {path:?}.");
            self.source = Some(open_file(&path).await?);
        }
        Ok(())
    }

    fn dispatch(&mut self) {
        let Some(uploader) = &self.uploader else {
            return;
        };
        self.queue.dispatch(|part| {
            let uploader = uploader.clone();
            let span = tracing::trace_span!("part_uploader", part_number = part.number);
            async move { uploader.upload(part).await }.instrument(span)
        });
    }

    fn on_command(&mut self, command: ControlCommand) -> UploadResult<()> {
        tracing::debug!("Received {command:?} in state {:?}.", self.state);
        match command {
            ControlCommand::Pause => self.queue.pause(),
            ControlCommand::Resume => self.queue.resume(),
            ControlCommand::Abort => return Err(UploadException::Aborted),
        }
        Ok(())
    }

    fn on_chunk(&mut self, chunk: Option<std::io::Result<Vec<u8>>>) -> UploadResult<()> {
        match chunk {
            Some(Ok(chunk)) => match self.buffer.push(chunk) {
                Ok(Some(part)) => self.route(part),
                Ok(None) => {}
                Err(e) => {
                    if let UploadException::TotalSizeExceeded {
                        total_size,
                        max_total_size,
                    } = e
                    {
                        self.events.emit(UploadEvent::TotalSizeExceeded {
                            total_size,
                            max_total_size,
                        });
                    }
                    return Err(e);
                }
            },
            Some(Err(source)) => return Err(UploadException::SourceFailed { source }),
            None => {
                if let Some(part) = self.buffer.finish() {
                    self.route(part);
                }
                self.source = None;
                tracing::debug!(
                    "Source ended after {} bytes in {} parts.",
                    self.buffer.total_size(),
                    self.buffer.parts_emitted()
                );
                if self.buffer.parts_emitted() == 0 {
                    return Err(UploadException::EmptySource);
                }
            }
        }
        Ok(())
    }

    fn route(&mut self, part: Part) {
        if let Some(part) = self.pending.offer(part) {
            self.queue.push(part);
        }
    }

    fn on_part_finished(&mut self, finished: Result<PartOutcome, JoinError>) -> UploadResult<()> {
        let outcome = finished.map_err(|e| anyhow!("Part upload task failed: {e}"))?;
        match outcome {
            PartOutcome::Uploaded {
                completed,
                size,
                retries,
            } => {
                let part_number = completed.part_number;
                self.parts.push(completed);
                self.total_written += size;
                let total_size = self.buffer.total_size();
                let total_percent = if self.buffer.is_ended() && total_size > 0 {
                    self.total_written as f64 / total_size as f64 * 100.0
                } else {
                    0.0
                };
                tracing::debug!(
                    "Part {part_number} accepted after {retries} retries, {}/{total_size} bytes written.",
                    self.total_written
                );
                self.events.emit(UploadEvent::PartUploaded { part_number });
                self.events.emit(UploadEvent::Progress(UploadProgress {
                    part: part_number,
                    part_size: size,
                    total_written: self.total_written,
                    total_size,
                    total_percent,
                }));
                Ok(())
            }
            PartOutcome::Cancelled { part_number } => {
                tracing::debug!("Part {part_number} was cancelled.");
                Ok(())
            }
            PartOutcome::Failed {
                part_number,
                retries,
                budget_exhausted: false,
                source,
            } => Err(UploadException::PartUploadFailed {
                part_number,
                retries,
                source,
            }),
            PartOutcome::Failed {
                part_number,
                budget_exhausted: true,
                source,
                ..
            } => Err(UploadException::RetryBudgetExhausted {
                part_number,
                max_total_retries: self.config.max_total_retries.unwrap_or_default(),
                source,
            }),
        }
    }

    async fn complete(&mut self) -> UploadResult<CompletedUpload> {
        self.state = SessionState::Completing;
        let upload_id = self
            .upload_id
            .clone()
            .ok_or_else(|| anyhow!("Completing an upload without upload id."))?;
        self.events.emit(UploadEvent::Completing {
            upload_id: upload_id.clone(),
        });

        let mut parts = std::mem::take(&mut self.parts);
        parts.sort_by_key(|part| part.part_number);
        tracing::debug!("Completing upload {upload_id} with {} parts.", parts.len());
        // The complete call cannot be preempted, an abort takes effect once it returns.
        let (completed, aborted) = {
            let complete = self.backend.complete_upload(&self.config.target, &upload_id, &parts);
            tokio::pin!(complete);
            let mut aborted = false;
            let completed = loop {
                tokio::select! {
                    biased;
                    Ok(command) = self.control.recv_async(), if !aborted => match command {
                        ControlCommand::Abort => aborted = true,
                        command => tracing::debug!("Ignoring {command:?} while completing."),
                    },
                    completed = &mut complete => break completed,
                }
            };
            (completed, aborted)
        };
        if aborted {
            if let Err(e) = completed {
                tracing::warn!("Complete of aborted upload {upload_id} failed: {e:#}");
            }
            return Err(UploadException::Aborted);
        }
        if let Err(source) = completed {
            return Err(UploadException::CompleteFailed { upload_id, source });
        }

        self.state = SessionState::Complete;
        tracing::info!(
            "Uploaded {} bytes to {} as upload {upload_id}.",
            self.total_written,
            self.config.target
        );
        self.events.emit(UploadEvent::Completed {
            upload_id: upload_id.clone(),
        });
        Ok(CompletedUpload {
            upload_id,
            parts,
            total_written: self.total_written,
            total_size: self.buffer.total_size(),
        })
    }

    /// Tear the upload down, returning `reason` for the caller.
    async fn abort(&mut self, reason: UploadException) -> UploadException {
        if self.state.is_aborting_or_aborted() {
            return reason;
        }
        if !matches!(reason, UploadException::Aborted) {
            tracing::error!("Aborting upload to {}: {reason}", self.config.target);
            self.events.emit(UploadEvent::Error {
                message: reason.to_string(),
            });
        }
        self.state = SessionState::Aborting;
        self.abort.trigger();
        self.pending.discard();
        self.buffer.discard();
        self.source = None;
        self.parts.clear();
        let killed = self.queue.kill();
        tracing::debug!("Dropped {killed} queued parts.");
        self.events.emit(UploadEvent::Aborting {
            upload_id: self.upload_id.clone(),
        });

        // In-flight calls cannot be preempted, their results are dropped. They
        // end before the backend drops the upload.
        while self.queue.next_finished().await.is_some() {}
        if let Some(upload_id) = &self.upload_id {
            if let Err(e) = self.backend.abort_upload(&self.config.target, upload_id).await {
                tracing::warn!("Failed to abort upload {upload_id}: {e:#}");
                self.events.emit(UploadEvent::Error {
                    message: format!("Failed to abort upload {upload_id}: {e}"),
                });
            }
        }

        self.state = SessionState::Aborted;
        self.events.emit(UploadEvent::Aborted {
            upload_id: self.upload_id.clone(),
        });
        reason
    }
}

async fn next_chunk(source: &mut Option<ByteStream>) -> Option<std::io::Result<Vec<u8>>> {
    match source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}
