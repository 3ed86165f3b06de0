//! Reader and writer types handed out by the memory backend.

use bytes::Bytes;
use chrono::Utc;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::backend::{NodeKind, SharedTree};

/// Serves a snapshot of the file taken at open time.
///
/// With a throttle configured, every read returns at most `max_chunk` bytes
/// and is preceded by `delay`, which makes transfers slow enough to pause or
/// cancel mid-file.
pub(crate) struct MemoryReader {
    data: Bytes,
    position: usize,
    throttle: Option<(Duration, usize)>,
    sleep: Option<Pin<Box<Sleep>>>,
    /// Position at which reading fails
    cutoff: Option<usize>,
}

impl MemoryReader {
    pub(crate) fn new(data: Bytes, throttle: Option<(Duration, usize)>) -> Self {
        Self {
            data,
            position: 0,
            throttle,
            sleep: None,
            cutoff: None,
        }
    }

    pub(crate) fn with_cutoff(mut self, cutoff: Option<usize>) -> Self {
        self.cutoff = cutoff;
        self
    }
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.cutoff.is_some_and(|cutoff| this.position >= cutoff) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "injected read failure",
            )));
        }
        if this.position >= this.data.len() {
            return Poll::Ready(Ok(()));
        }

        let mut limit = buf.remaining();
        if let Some((delay, max_chunk)) = this.throttle {
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
            if sleep.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            this.sleep = None;
            limit = limit.min(max_chunk.max(1));
        }

        let mut end = (this.position + limit).min(this.data.len());
        if let Some(cutoff) = this.cutoff {
            end = end.min(cutoff);
        }
        buf.put_slice(&this.data[this.position..end]);
        this.position = end;
        Poll::Ready(Ok(()))
    }
}

/// Appends every write straight into the tree, so partially written files
/// are visible the way they are on a real share.
pub(crate) struct MemoryWriter {
    tree: SharedTree,
    path: String,
}

impl MemoryWriter {
    pub(crate) fn new(tree: SharedTree, path: String) -> Self {
        Self { tree, path }
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut tree = self.tree.write();
        match tree.get_mut(&self.path) {
            Some(node) => match &mut node.kind {
                NodeKind::File(contents) => {
                    contents.extend_from_slice(buf);
                    node.modified = Utc::now();
                    Poll::Ready(Ok(buf.len()))
                }
                NodeKind::Directory => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} became a directory", self.path),
                ))),
            },
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was removed while writing", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
