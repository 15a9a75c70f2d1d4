//! Throttled relay from archive output to a chunk sink.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};

/// Chunking and pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Upper bound for a single chunk, in bytes.
    pub chunk_size: usize,
    /// Pause between two chunks. Zero disables pacing.
    pub delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: Duration::ZERO,
        }
    }
}

/// Totals of a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub chunks: usize,
    pub bytes: u64,
}

/// Destination of relayed chunks.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;
}

#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Feeds chunks into the channel backing an HTTP response body.
///
/// Failures travel on a separate one-shot channel so reporting one never
/// waits for the body to drain buffered chunks.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    failure: Option<oneshot::Sender<io::Error>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self { tx, failure: None }
    }

    /// Route [`abort`](Self::abort) errors to `failure`.
    pub fn with_failure(mut self, failure: oneshot::Sender<io::Error>) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Report an error to the body so the connection is aborted instead of
    /// ending cleanly.
    ///
    /// Returns `false` when the body is already gone or no failure channel
    /// was attached.
    pub fn abort(&mut self, error: io::Error) -> bool {
        match self.failure.take() {
            Some(failure) => failure.send(error).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body was dropped"))
    }
}

/// Copy `output` to `sink` chunk by chunk.
///
/// Each chunk is whatever a single read returns, at most
/// `settings.chunk_size` bytes. After each write the relay checks for end of
/// stream and, if more data follows, sleeps for `settings.delay`. The delay is
/// never applied after the last chunk.
///
/// Reads, writes and the delay all race against `cancel`; if it fires first
/// the relay stops with [`Error::Cancelled`].
pub async fn relay<R, S>(
    output: R,
    sink: &mut S,
    settings: &RelaySettings,
    cancel: &CancellationToken,
) -> Result<RelayStats>
where
    R: AsyncRead + Unpin,
    S: ChunkSink + ?Sized,
{
    let mut reader = BufReader::with_capacity(settings.chunk_size.max(1), output);
    let mut stats = RelayStats::default();

    let mut chunk = next_chunk(&mut reader, cancel).await?;
    loop {
        debug!(len = chunk.len(), "Sending archive chunk");
        stats.chunks += 1;
        stats.bytes += chunk.len() as u64;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            written = sink.write_chunk(chunk) => written.map_err(Error::Write)?,
        }

        chunk = next_chunk(&mut reader, cancel).await?;
        if chunk.is_empty() {
            return Ok(stats);
        }

        if !settings.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(settings.delay) => {}
            }
        }
    }
}

/// Take the next buffered read. An empty chunk means end of stream.
async fn next_chunk<R>(reader: &mut BufReader<R>, cancel: &CancellationToken) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let chunk = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        filled = reader.fill_buf() => Bytes::copy_from_slice(filled.map_err(Error::Read)?),
    };
    reader.consume(chunk.len());
    Ok(chunk)
}
