//! In-memory archive producer.
//!
//! Replays a fixed script of reads instead of running an archiver, and counts
//! how often processes are started and stopped.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};

use super::producer::{ArchiveProcess, ArchiveProducer, ProcessStatus};
use crate::error::{Error, Result};

/// One step of a scripted output stream.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Bytes returned by the next read(s).
    Data(Bytes),
    /// The next read fails with this error kind.
    Fail(io::ErrorKind),
    /// Every further read stays pending.
    Stall,
}

impl ReadStep {
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self::Data(bytes.into())
    }
}

#[derive(Debug, Default)]
struct Counters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    kills: AtomicUsize,
}

/// Producer whose processes replay a script from memory.
#[derive(Debug, Clone)]
pub struct MemoryProducer {
    script: Vec<ReadStep>,
    fail_launch: bool,
    counters: Arc<Counters>,
    directories: Arc<Mutex<Vec<PathBuf>>>,
}

impl MemoryProducer {
    pub fn new(script: Vec<ReadStep>) -> Self {
        Self {
            script,
            fail_launch: false,
            counters: Arc::default(),
            directories: Arc::default(),
        }
    }

    /// A producer that emits `bytes` and then ends.
    pub fn with_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(vec![ReadStep::Data(bytes.into())])
    }

    /// A producer whose every start fails like a missing binary.
    pub fn failing() -> Self {
        let mut producer = Self::new(Vec::new());
        producer.fail_launch = true;
        producer
    }

    /// Number of processes started.
    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls across all processes.
    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls that found the process still running.
    pub fn kills(&self) -> usize {
        self.counters.kills.load(Ordering::SeqCst)
    }

    /// Directories passed to `start`, in order.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.directories
            .lock()
            .map(|dirs| dirs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ArchiveProducer for MemoryProducer {
    async fn start(&self, directory: &Path) -> Result<Box<dyn ArchiveProcess>> {
        if self.fail_launch {
            return Err(Error::launch(
                "memory",
                io::Error::new(io::ErrorKind::NotFound, "archiver unavailable"),
            ));
        }

        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut dirs) = self.directories.lock() {
            dirs.push(directory.to_path_buf());
        }

        Ok(Box::new(MemoryProcess {
            output: ScriptedReader::new(self.script.clone()),
            status: ProcessStatus::Running,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MemoryProcess {
    output: ScriptedReader,
    status: ProcessStatus,
    counters: Arc<Counters>,
}

#[async_trait]
impl ArchiveProcess for MemoryProcess {
    fn output(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        &mut self.output
    }

    fn status(&mut self) -> ProcessStatus {
        if self.status.is_running() && self.output.is_finished() {
            self.status = ProcessStatus::Exited(Some(0));
        }
        self.status
    }

    async fn stop(&mut self) -> Result<ProcessStatus> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        if self.status().is_running() {
            self.counters.kills.fetch_add(1, Ordering::SeqCst);
            self.status = ProcessStatus::Killed;
        }
        Ok(self.status)
    }
}

/// `AsyncRead` over a [`ReadStep`] script.
#[derive(Debug)]
pub struct ScriptedReader {
    steps: VecDeque<ReadStep>,
}

impl ScriptedReader {
    pub fn new(steps: impl IntoIterator<Item = ReadStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Whether the script has been read to its end.
    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            match self.steps.front_mut() {
                None => return Poll::Ready(Ok(())),
                Some(ReadStep::Stall) => return Poll::Pending,
                Some(ReadStep::Fail(kind)) => {
                    let kind = *kind;
                    self.steps.pop_front();
                    return Poll::Ready(Err(io::Error::new(kind, "scripted read failure")));
                }
                Some(ReadStep::Data(data)) if data.is_empty() => {
                    self.steps.pop_front();
                }
                Some(ReadStep::Data(data)) => {
                    let n = data.len().min(buf.remaining());
                    buf.put_slice(&data.split_to(n));
                    if data.is_empty() {
                        self.steps.pop_front();
                    }
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}
