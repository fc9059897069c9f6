use std::path::PathBuf;

use futures::stream::BoxStream;

/// Sequential byte source delivering chunks with arbitrary boundaries.
pub type ByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Input of an upload.
pub enum UploadSource {
    /// An already open stream.
    Stream(ByteStream),
    /// A file opened once the upload identity is acquired.
    File(PathBuf),
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadSource::Stream(_) => f.write_str("Stream"),
            UploadSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}
