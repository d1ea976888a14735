//! Bounded file streaming

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use super::{MediaError, RangeWindow, ServePlan};

/// Read buffer for partial responses
pub const PARTIAL_READ_BUFFER: usize = 64 * 1024;

/// Read buffer for full-file responses
pub const FULL_READ_BUFFER: usize = 128 * 1024;

/// Stream of file chunks, each at most the configured buffer size.
/// A read error is yielded as the last item.
pub type MediaStream = ReaderStream<Take<File>>;

/// Open `path` and stream exactly the bytes of `window`
pub async fn open_stream(
    path: &Path,
    window: RangeWindow,
    buffer_size: usize,
) -> Result<MediaStream, MediaError> {
    let mut file = File::open(path).await?;
    if window.start > 0 {
        file.seek(SeekFrom::Start(window.start)).await?;
    }

    Ok(ReaderStream::with_capacity(file.take(window.len()), buffer_size))
}

impl ServePlan {
    /// Open the byte stream for this plan
    pub async fn open(&self) -> Result<MediaStream, MediaError> {
        let path = self.asset().path.as_deref().ok_or(MediaError::NotFound)?;
        let buffer_size = match self {
            ServePlan::Full { .. } => FULL_READ_BUFFER,
            ServePlan::Partial { .. } => PARTIAL_READ_BUFFER,
        };
        open_stream(path, self.window(), buffer_size).await
    }
}
