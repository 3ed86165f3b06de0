//! Chunked, cancellable data transfer.

use crate::context::JobContext;
use async_trait::async_trait;
use core_vfs::{ResourceLocator, VfsError, VfsResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Destination of a transfer.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> VfsResult<()>;

    /// Called once after the last chunk of a completed transfer.
    async fn finish(&mut self) -> VfsResult<()>;
}

/// [`ChunkSink`] over any `AsyncWrite`.
pub struct WriterSink<W> {
    writer: W,
    locator: ResourceLocator,
}

impl<W> WriterSink<W> {
    /// `locator` names the destination in errors.
    pub fn new(writer: W, locator: ResourceLocator) -> Self {
        Self { writer, locator }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: &[u8]) -> VfsResult<()> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| VfsError::from_io(&self.locator, e))
    }

    async fn finish(&mut self) -> VfsResult<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| VfsError::from_io(&self.locator, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Every byte was moved
    Completed(u64),
    /// Cancelled after moving this many bytes
    Interrupted(u64),
}

/// Moves `reader` into `sink` one chunk at a time.
///
/// Cancellation is checked before every chunk and while a read is pending.
/// Every chunk is counted in the job's progress. `source` names the reader
/// in errors.
pub async fn transfer<R, S>(
    ctx: &JobContext,
    source: &ResourceLocator,
    reader: &mut R,
    sink: &mut S,
) -> VfsResult<TransferOutcome>
where
    R: AsyncRead + Unpin + Send + ?Sized,
    S: ChunkSink + ?Sized,
{
    let token = ctx.cancellation_token();
    let mut buffer = vec![0u8; ctx.config().chunk_size.max(1)];
    let mut moved = 0u64;

    loop {
        if token.is_cancelled() {
            return Ok(TransferOutcome::Interrupted(moved));
        }

        let read = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(TransferOutcome::Interrupted(moved)),
            read = reader.read(&mut buffer) => read.map_err(|e| VfsError::from_io(source, e))?,
        };
        if read == 0 {
            break;
        }

        sink.write_chunk(&buffer[..read]).await?;
        moved += read as u64;
        ctx.add_bytes(read as u64);
    }

    sink.finish().await?;
    Ok(TransferOutcome::Completed(moved))
}
