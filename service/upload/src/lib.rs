mod concurrency;
mod part_buffer;
mod part_uploader;
mod pending;
mod session;
mod source;

#[rustfmt::skip]
pub use {
    concurrency::ConcurrencyQueue,
    part_buffer::PartBuffer,
    part_uploader::{AbortSignal, PartOutcome, PartUploader, RetryBudget},
    pending::PendingQueue,
    session::{UploadController, UploadSession},
    source::{open_file, reader_stream, FILE_READ_CHUNK_SIZE},
};
