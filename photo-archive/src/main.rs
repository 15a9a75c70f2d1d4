use std::sync::Arc;

use mimalloc::MiMalloc;
use photo_archive::api::{ApiServer, ApiServerConfig, AppState};
use photo_archive::archive::ZipProducer;
use photo_archive::config::AppConfig;
use photo_archive::logging;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging_level)?;

    info!(
        photos_dir = %config.photos_dir.display(),
        response_delay = ?config.response_delay,
        chunk_size = config.chunk_size,
        "Starting photo-archive"
    );
    if !config.photos_dir.is_dir() {
        warn!(
            photos_dir = %config.photos_dir.display(),
            "Photos directory does not exist, every download will return 404"
        );
    }

    let state = AppState::from_config(&config, Arc::new(ZipProducer::new()));
    let server = ApiServer::with_state(ApiServerConfig::from(&config), state);

    let shutdown = server.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    server.run().await?;
    Ok(())
}
