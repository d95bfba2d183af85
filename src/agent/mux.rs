//! Stream multiplexer — merges several byte streams into one.
//!
//! Each source is drained by its own task and forwarded into a shared channel,
//! so bytes from one source keep their order while sources interleave freely.
//! The merged stream ends once every source has ended.

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A boxed stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Read size used when adapting an `AsyncRead` into a [`ByteStream`].
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Chunks buffered between the source tasks and the merged stream.
const MERGE_BUFFER: usize = 64;

/// Adapt any async reader (child stdout/stderr, in-memory pipes) into a byte stream.
///
/// The stream ends at EOF and after yielding the first read error.
pub fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    }))
}

/// Merge `sources` into one stream.
///
/// A source error is forwarded as soon as it is read, regardless of what the
/// other sources are doing; that source stops contributing afterwards. With no
/// sources the merged stream is already ended.
pub fn merge_streams(sources: Vec<ByteStream>) -> ByteStream {
    let (tx, rx) = mpsc::channel(MERGE_BUFFER);

    for (index, mut source) in sources.into_iter().enumerate() {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    // Merged stream dropped; nobody is listening anymore.
                    break;
                }
                if failed {
                    tracing::debug!(source = index, "Source stream failed; detaching it");
                    break;
                }
            }
        });
    }

    Box::pin(ReceiverStream::new(rx))
}
