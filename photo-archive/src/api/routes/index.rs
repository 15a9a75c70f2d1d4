//! Static index page.

use axum::extract::State;
use axum::response::Html;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Serve the configured HTML page, read in full on every request.
pub async fn index_page(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let contents = tokio::fs::read_to_string(state.index_page.as_path())
        .await
        .map_err(|e| {
            tracing::error!(
                path = %state.index_page.display(),
                error = %e,
                "Failed to read index page"
            );
            ApiError::internal("Index page unavailable")
        })?;

    Ok(Html(contents))
}
