//! Startup configuration.
//!
//! Values come from command-line flags, falling back to environment variables
//! (a `.env` file is loaded first), falling back to built-in defaults. The
//! resulting [`AppConfig`] is immutable for the lifetime of the server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::archive::RelaySettings;
use crate::error::{Error, Result};

/// Default directory holding one sub-directory per archive.
pub const DEFAULT_PHOTOS_DIR: &str = "test_photos";

/// Default maximum number of bytes forwarded per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500_000;

/// Shown under `--help` for users of the old two-letter short flags.
const SHORT_FLAGS_NOTE: &str =
    "Short flags changed: use -r instead of -rd and -l instead of -ll. \
     --response_delay, --logging_level and --folder_with_photos still work.";

/// Default HTML page served at `/`.
pub const DEFAULT_INDEX_PAGE: &str = "index.html";

/// Command-line arguments.
///
/// The short flags are single characters: `-r` and `-l` replace the
/// two-letter `-rd` and `-ll` of older releases, which clap cannot express.
/// The long underscore spellings (`--response_delay`, `--logging_level`,
/// `--folder_with_photos`) are still accepted.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "photo-archive",
    version,
    about = "Download photo archive",
    after_help = SHORT_FLAGS_NOTE
)]
pub struct Args {
    /// Pause between two archive chunks, in whole seconds.
    #[arg(
        short = 'r',
        long = "response-delay",
        visible_alias = "response_delay",
        env = "DEFAULT_RESPONSE_DELAY",
        default_value_t = 0
    )]
    pub response_delay: u64,

    /// Log level (trace, debug, info, warning, error).
    #[arg(
        short = 'l',
        long = "logging-level",
        visible_alias = "logging_level",
        env = "DEFAULT_LOGGING_LEVEL",
        default_value = "INFO"
    )]
    pub logging_level: String,

    /// Directory containing one sub-directory per archive.
    #[arg(
        short = 'f',
        long = "folder-with-photos",
        visible_alias = "folder_with_photos",
        env = "DEFAULT_DIR_WITH_PHOTOS",
        default_value = DEFAULT_PHOTOS_DIR
    )]
    pub folder_with_photos: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "ARCHIVE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "ARCHIVE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// HTML page served at `/`.
    #[arg(long, env = "ARCHIVE_INDEX_PAGE", default_value = DEFAULT_INDEX_PAGE)]
    pub index_page: PathBuf,

    /// Maximum bytes per forwarded chunk.
    #[arg(long, env = "ARCHIVE_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

/// Immutable server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub photos_dir: PathBuf,
    pub response_delay: Duration,
    pub logging_level: String,
    pub host: String,
    pub port: u16,
    pub index_page: PathBuf,
    pub chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            photos_dir: PathBuf::from(DEFAULT_PHOTOS_DIR),
            response_delay: Duration::ZERO,
            logging_level: "INFO".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            index_page: PathBuf::from(DEFAULT_INDEX_PAGE),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl AppConfig {
    /// Load `.env`, parse the process arguments and validate the result.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(Args::parse())
    }

    /// Build and validate a configuration from parsed arguments.
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Self {
            photos_dir: args.folder_with_photos,
            response_delay: Duration::from_secs(args.response_delay),
            logging_level: args.logging_level,
            host: args.host,
            port: args.port,
            index_page: args.index_page,
            chunk_size: args.chunk_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk size must be greater than zero"));
        }
        if self.photos_dir.as_os_str().is_empty() {
            return Err(Error::config("photos directory must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(Error::config("bind address must not be empty"));
        }
        Ok(())
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            chunk_size: self.chunk_size,
            delay: self.response_delay,
        }
    }
}
