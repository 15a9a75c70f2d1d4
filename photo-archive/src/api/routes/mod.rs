//! API route modules.

pub mod archive;
pub mod index;

use axum::Router;
use axum::routing::get;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index_page))
        .nest("/archive", archive::router())
        .with_state(state)
}
