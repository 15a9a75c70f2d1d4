//! Archive pipeline: locate a directory, zip it with an external process and
//! relay the process output to a sink in paced chunks.

pub mod locator;
pub mod memory;
pub mod producer;
pub mod relay;
pub mod stream;

pub use locator::{ArchiveLocator, ArchiveRequest};
pub use memory::{MemoryProducer, ReadStep};
pub use producer::{ArchiveProcess, ArchiveProducer, ProcessStatus, ZipProducer};
pub use relay::{ChannelSink, ChunkSink, RelaySettings, RelayStats, relay};
pub use stream::stream_archive;
