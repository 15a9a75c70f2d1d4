//! HTTP surface: the index page and the archive download endpoint.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
