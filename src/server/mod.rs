//! HTTP boundary: one `POST /` per query image.
//!
//! Every request is answered with `200` and a pose body. Failures are
//! logged under the request id and answered with the default pose, which
//! is the contract the mobile client is built against.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::LocResult;
use crate::orchestrator::Orchestrator;
use crate::registry::SightRegistry;
use crate::session::SessionCache;
use crate::wire::{self, PoseResult};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SightRegistry>,
    sessions: Arc<SessionCache>,
    orchestrator: Arc<Orchestrator>,
    /// Serve every request against this sight instead of choosing by GPS.
    pinned_sight: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        registry: Arc<SightRegistry>,
        sessions: Arc<SessionCache>,
        orchestrator: Arc<Orchestrator>,
        pinned_sight: Option<String>,
    ) -> Self {
        Self {
            registry,
            sessions,
            orchestrator,
            pinned_sight: pinned_sight.map(Arc::from),
        }
    }
}

pub fn router(state: AppState, max_payload_bytes: usize) -> Router {
    Router::new()
        .route("/", post(localize))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    log_info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn localize(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    log_debug!("[{request_id}] received {} byte payload", body.len());

    let pose = match handle_payload(&state, &body).await {
        Ok(pose) => {
            log_info!(
                "[{request_id}] answered in {}ms",
                started.elapsed().as_millis()
            );
            pose
        }
        Err(err) => {
            log_warn!("[{request_id}] answering with default pose: {err}");
            None
        }
    };

    pose_response(pose.as_ref())
}

async fn handle_payload(state: &AppState, payload: &[u8]) -> LocResult<Option<PoseResult>> {
    let request = wire::decode(payload)?;

    let sight_id = match &state.pinned_sight {
        Some(sight_id) => sight_id.to_string(),
        None => state.registry.select_sight(&request.gps)?,
    };

    let session = state.sessions.get_or_create(&sight_id).await?;
    state.orchestrator.run_localization(&session, request).await
}

fn pose_response(pose: Option<&PoseResult>) -> Response {
    let mut response = (StatusCode::OK, wire::encode(pose)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
