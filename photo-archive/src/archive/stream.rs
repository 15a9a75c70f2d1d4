//! Relay plus guaranteed process teardown for one download.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::producer::ArchiveProcess;
use super::relay::{ChunkSink, RelaySettings, RelayStats, relay};
use crate::error::Result;

/// Relay the archive produced by `process` into `sink`, then stop the process.
///
/// The process is stopped exactly once, whether the relay finished, failed or
/// was cancelled, and the relay result is returned unchanged afterwards. A
/// cancelled download therefore surfaces as [`Error::Cancelled`] only after
/// the archiver has been killed and reaped.
///
/// If this future is dropped before completion the child is still killed by
/// its `kill_on_drop` handle, but it is not reaped here.
///
/// [`Error::Cancelled`]: crate::Error::Cancelled
pub async fn stream_archive<S>(
    mut process: Box<dyn ArchiveProcess>,
    sink: &mut S,
    settings: &RelaySettings,
    cancel: &CancellationToken,
) -> Result<RelayStats>
where
    S: ChunkSink + ?Sized,
{
    let result = relay(process.output(), sink, settings, cancel).await;

    match &result {
        Ok(stats) => info!(chunks = stats.chunks, bytes = stats.bytes, "Archive sent"),
        Err(e) if e.is_stream_error() => error!(error = %e, "Archive streaming failed"),
        Err(e) => error!(error = %e, "Download was interrupted"),
    }

    if let Err(e) = process.stop().await {
        warn!(error = %e, "Failed to stop archiver");
    }

    result
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::Error;
    use crate::archive::memory::{MemoryProducer, ReadStep};
    use crate::archive::producer::ArchiveProducer;

    fn settings() -> RelaySettings {
        RelaySettings {
            chunk_size: 4,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_success_stops_process_once() {
        let producer = MemoryProducer::new(vec![
            ReadStep::data("PK\x03\x04"),
            ReadStep::data("rest"),
        ]);
        let process = producer.start(Path::new("dir")).await.unwrap();
        let mut sink = Vec::new();

        let stats = stream_archive(process, &mut sink, &settings(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink, b"PK\x03\x04rest");
        assert_eq!(stats.chunks, 2);
        assert_eq!(producer.stops(), 1);
        assert_eq!(producer.kills(), 0);
    }

    #[tokio::test]
    async fn test_read_error_still_stops_process() {
        let producer = MemoryProducer::new(vec![
            ReadStep::data("PK"),
            ReadStep::Fail(io::ErrorKind::Other),
            ReadStep::Stall,
        ]);
        let process = producer.start(Path::new("dir")).await.unwrap();
        let mut sink = Vec::new();

        let err = stream_archive(process, &mut sink, &settings(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Read(_)));
        assert_eq!(producer.stops(), 1);
        assert_eq!(producer.kills(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_kills_and_propagates() {
        let producer = MemoryProducer::new(vec![ReadStep::data("PK"), ReadStep::Stall]);
        let process = producer.start(Path::new("dir")).await.unwrap();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut sink: Vec<u8> = Vec::new();
                stream_archive(process, &mut sink, &settings(), &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(producer.stops(), 1);
        assert_eq!(producer.kills(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_delay_kills_process() {
        let producer = MemoryProducer::new(vec![
            ReadStep::data("aaaa"),
            ReadStep::data("bbbb"),
            ReadStep::Stall,
        ]);
        let process = producer.start(Path::new("dir")).await.unwrap();
        let settings = RelaySettings {
            chunk_size: 2,
            delay: Duration::from_secs(60),
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let mut sink = Vec::new();
        let result = stream_archive(process, &mut sink, &settings, &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(sink, b"aa");
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(producer.stops(), 1);
        assert_eq!(producer.kills(), 1);
    }

    #[tokio::test]
    async fn test_client_disconnect_stops_process() {
        let producer = MemoryProducer::new(vec![
            ReadStep::data(Bytes::from_static(b"aaaabbbb")),
            ReadStep::Stall,
        ]);
        let process = producer.start(Path::new("dir")).await.unwrap();
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let mut sink = crate::archive::ChannelSink::new(tx);

        let err = stream_archive(process, &mut sink, &settings(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_stream_error());
        assert_eq!(producer.stops(), 1);
    }
}
