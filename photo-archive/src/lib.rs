//! photo-archive library crate.
//!
//! Streams a directory to an HTTP client as a zip archive produced on the fly
//! by an external `zip` process.

pub mod api;
pub mod archive;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
