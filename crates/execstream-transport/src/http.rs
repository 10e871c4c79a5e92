//! HTTP routes and server-sent-events streaming.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use execstream_controller::ExecutionController;
use execstream_core::{ApiError, ErrorCode, Execution};
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::TraceLayer;

use crate::protocol::{EXECUTION_EVENT, ErrorBody, ExecutionList, decode_body, decode_status};

/// Snapshots buffered between a subscription and its response body.
pub const STREAM_BUFFER: usize = 16;

/// Handler state.
#[derive(Clone)]
pub struct HttpState {
    controller: Arc<ExecutionController>,
    shutdown: CancellationToken,
}

impl HttpState {
    /// Cancelling `shutdown` ends every open event stream.
    #[must_use]
    pub const fn new(controller: Arc<ExecutionController>, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }
}

/// An `ApiError` rendered as an HTTP response.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = status_code(self.0.code());
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

/// HTTP status of an error class.
#[must_use]
pub const fn status_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the execution router.
///
/// # Example
/// ```ignore
/// let app = router(controller).layer(CorsLayer::permissive());
/// ```
#[must_use]
pub fn router(controller: Arc<ExecutionController>) -> Router {
    router_with_shutdown(controller, CancellationToken::new())
}

/// Build the execution router; cancelling `shutdown` closes open streams so
/// a graceful shutdown can complete.
#[must_use]
pub fn router_with_shutdown(
    controller: Arc<ExecutionController>,
    shutdown: CancellationToken,
) -> Router {
    Router::new()
        .route("/executions", post(create_execution))
        .route(
            "/executions/{id}",
            get(get_execution).delete(delete_execution),
        )
        .route("/executions/{id}/status", post(update_status))
        .route("/executions/{id}/stream", get(stream_execution))
        .route("/sessions/{id}/executions", get(list_by_session))
        .layer(TraceLayer::new_for_http())
        .with_state(HttpState::new(controller, shutdown))
}

async fn create_execution(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Execution>), HttpError> {
    let execution: Execution = decode_body(&body)?;
    let created = state.controller.create(execution).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_execution(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, HttpError> {
    Ok(Json(state.controller.get(&id).await?))
}

async fn delete_execution(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, HttpError> {
    Ok(Json(state.controller.delete(&id).await?))
}

async fn list_by_session(
    State(state): State<HttpState>,
    Path(session_id): Path<String>,
) -> Result<Json<ExecutionList>, HttpError> {
    let executions = state.controller.list_by_session(&session_id).await?;
    Ok(Json(ExecutionList { executions }))
}

async fn update_status(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Execution>, HttpError> {
    let status = decode_status(&body)?;
    Ok(Json(state.controller.update_status(&id, status).await?))
}

/// Stream an execution as server-sent events.
///
/// The response is only sent once the current state has been read, so an
/// invalid or unknown id yields an error status instead of an empty stream.
/// Dropping the response body cancels the subscription.
async fn stream_execution(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, HttpError> {
    let (tx, mut rx) = mpsc::channel::<Execution>(STREAM_BUFFER);
    let cancel = state.shutdown.child_token();

    let task = tokio::spawn({
        let controller = Arc::clone(&state.controller);
        let cancel = cancel.clone();
        let id = id.clone();
        async move {
            let result = controller.subscribe(&id, tx, cancel).await;
            match &result {
                Ok(outcome) => tracing::debug!(
                    execution_id = %id,
                    relayed = outcome.relayed,
                    end = ?outcome.end,
                    "Event stream finished"
                ),
                Err(e) => tracing::debug!(execution_id = %id, error = %e, "Event stream failed"),
            }
            result
        }
    });

    // The sink only closes after the subscription has returned.
    let Some(first) = rx.recv().await else {
        let err = match task.await {
            Ok(Err(err)) => err,
            Ok(Ok(_)) => ApiError::internal("subscription ended before initial state", &id),
            Err(join) => ApiError::internal("subscription task failed", join),
        };
        return Err(err.into());
    };

    let events = stream::iter([first])
        .chain(ReceiverStream::new(rx))
        .map(|execution| Event::default().event(EXECUTION_EVENT).json_data(&execution))
        .boxed();

    Ok(Sse::new(cancel_on_drop(events, cancel.drop_guard())).keep_alive(KeepAlive::default()))
}

/// Ties `guard` to the lifetime of `inner`.
fn cancel_on_drop<T: Send + 'static>(
    inner: BoxStream<'static, T>,
    guard: DropGuard,
) -> impl Stream<Item = T> + Send + 'static {
    stream::unfold((inner, guard), |(mut inner, guard)| async move {
        let item = inner.next().await?;
        Some((item, (inner, guard)))
    })
}
