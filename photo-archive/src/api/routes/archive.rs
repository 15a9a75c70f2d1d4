//! Archive download route.
//!
//! `GET /archive/{identifier}/` zips the matching directory on the fly and
//! streams it to the client. The archiver output is relayed by a spawned task
//! into a bounded channel that backs the response body; dropping the body
//! (client disconnect) or shutting down the server cancels that task, which
//! then kills and reaps the archiver.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, info, info_span};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::archive::{ArchiveProcess, ChannelSink, RelaySettings, RelayStats, stream_archive};
use crate::error::Result;

/// Create the archive router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{identifier}/", get(download_archive))
}

/// Response body fed by the relay task.
///
/// Holds a guard on the download's cancellation token so that dropping the
/// body cancels the relay. Once every buffered chunk has been yielded, a
/// failure reported by the relay task is yielded as the final item so hyper
/// aborts the connection instead of terminating the body cleanly.
pub struct ArchiveBody {
    // Dropped first: cancel before the receiver closes.
    _cancel_on_drop: DropGuard,
    inner: ReceiverStream<io::Result<Bytes>>,
    failure: Option<oneshot::Receiver<io::Error>>,
}

impl Stream for ArchiveBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(item) = ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            return Poll::Ready(Some(item));
        }

        let Some(failure) = self.failure.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(failure).poll(cx));
        self.failure = None;
        Poll::Ready(outcome.ok().map(Err))
    }
}

/// Start relaying `process` on a background task.
///
/// Returns the body to hand to the client and the task handle, which resolves
/// to the relay result once the archiver has been stopped. Any failure,
/// cancellation included, ends the body with an error so a truncated archive
/// is never framed as a complete response.
pub fn spawn_download(
    process: Box<dyn ArchiveProcess>,
    settings: RelaySettings,
    cancel: CancellationToken,
) -> (ArchiveBody, JoinHandle<Result<RelayStats>>) {
    let (tx, rx) = mpsc::channel(1);
    let (failure_tx, failure_rx) = oneshot::channel();
    let body = ArchiveBody {
        _cancel_on_drop: cancel.clone().drop_guard(),
        inner: ReceiverStream::new(rx),
        failure: Some(failure_rx),
    };

    let task = tokio::spawn(
        async move {
            let mut sink = ChannelSink::new(tx).with_failure(failure_tx);
            let result = stream_archive(process, &mut sink, &settings, &cancel).await;
            if let Err(e) = &result {
                let kind = if e.is_cancelled() {
                    io::ErrorKind::Interrupted
                } else {
                    io::ErrorKind::Other
                };
                sink.abort(io::Error::new(kind, e.to_string()));
            }
            result
        }
        .in_current_span(),
    );

    (body, task)
}

/// Stream the archive of one directory.
async fn download_archive(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> ApiResult<Response> {
    let request = state.locator.resolve(&identifier)?;

    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", request.file_name()))
            .map_err(|_| ApiError::bad_request("Invalid archive identifier"))?;

    let span = info_span!("archive", identifier = %request.identifier);
    let process = state
        .producer
        .start(&request.directory)
        .instrument(span.clone())
        .await?;

    let (body, _task) = span.in_scope(|| {
        info!(directory = %request.directory.display(), "Streaming archive");
        spawn_download(process, state.relay, state.shutdown.child_token())
    });

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body),
    )
        .into_response())
}
