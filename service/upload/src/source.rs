use std::{io::ErrorKind, path::Path};

use domain_upload::{
    exception::{UploadException, UploadResult},
    model::vo::ByteStream,
};
use futures::stream;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read size used when streaming files.
pub const FILE_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Turn a reader into a chunk stream ending at EOF.
pub fn reader_stream<R>(reader: R, chunk_size: usize) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let chunk_size = chunk_size.max(1);
    Box::pin(stream::unfold(Some(reader), move |reader| async move {
        let mut reader = reader?;
        let mut buffer = vec![0; chunk_size];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => return None,
                Ok(n) => {
                    buffer.truncate(n);
                    return Some((Ok(buffer), Some(reader)));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // The stream ends after its first error.
                Err(e) => return Some((Err(e), None)),
            }
        }
    }))
}

/// Open a file as a chunk stream.
pub async fn open_file(path: &Path) -> UploadResult<ByteStream> {
    match tokio::fs::File::open(path).await {
        Ok(file) => Ok(reader_stream(file, FILE_READ_CHUNK_SIZE)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(UploadException::FileNotFound {
            path: path.to_owned(),
        }),
        Err(source) => Err(UploadException::SourceFailed { source }),
    }
}
