//! API server setup and configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::api::routes;
use crate::archive::{ArchiveLocator, ArchiveProducer, RelaySettings};
use crate::config::AppConfig;
use crate::error::{Error, Result};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl From<&AppConfig> for ApiServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bind_address: config.host.clone(),
            port: config.port,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Maps identifiers to directories
    pub locator: Arc<ArchiveLocator>,
    /// Starts archive processes
    pub producer: Arc<dyn ArchiveProducer>,
    /// Chunk size and pacing for downloads
    pub relay: RelaySettings,
    /// HTML page served at `/`
    pub index_page: Arc<PathBuf>,
    /// Cancelled on server shutdown; each download runs on a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        locator: ArchiveLocator,
        producer: Arc<dyn ArchiveProducer>,
        relay: RelaySettings,
        index_page: impl Into<PathBuf>,
    ) -> Self {
        Self {
            locator: Arc::new(locator),
            producer,
            relay,
            index_page: Arc::new(index_page.into()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the state described by the startup configuration.
    pub fn from_config(config: &AppConfig, producer: Arc<dyn ArchiveProducer>) -> Self {
        Self::new(
            ArchiveLocator::new(&config.photos_dir),
            producer,
            config.relay_settings(),
            &config.index_page,
        )
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create a server. Its shutdown token is the state's shutdown token, so
    /// shutting down also cancels in-flight downloads.
    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        let cancel_token = state.shutdown.clone();
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    use tower_http::trace::MakeSpan;
                    DefaultMakeSpan::new().level(Level::INFO).make_span(req)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        use tower_http::trace::OnResponse;
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .on_response(res, latency, span);
                    },
                )
                .on_failure(
                    |class: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        use tower_http::trace::OnFailure;
                        let mut on_failure = DefaultOnFailure::new().level(Level::ERROR);
                        on_failure.on_failure(class, latency, span);
                    },
                ),
        )
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Archive server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("Archive server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server and cancel in-flight downloads.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryProducer;

    fn state() -> AppState {
        AppState::new(
            ArchiveLocator::new("photos"),
            Arc::new(MemoryProducer::with_bytes("PK")),
            RelaySettings::default(),
            "index.html",
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..AppConfig::default()
        };
        let config = ApiServerConfig::from(&app);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_shutdown_cancels_download_tokens() {
        let server = ApiServer::with_state(ApiServerConfig::default(), state());
        let download = server.state.shutdown.child_token();

        assert!(!download.is_cancelled());
        server.shutdown();
        assert!(download.is_cancelled());
        assert!(server.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_address() {
        let config = ApiServerConfig {
            bind_address: "not an address".to_string(),
            port: 1,
        };
        let server = ApiServer::with_state(config, state());
        assert!(matches!(server.run().await, Err(Error::ApiError(_))));
    }
}
