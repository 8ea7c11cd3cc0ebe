use std::future::ready;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::gateway::PersistenceGateway;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::{ingest, time::TimeSource};

#[derive(Clone)]
pub struct State {
    pub gateway: PersistenceGateway,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    gateway: PersistenceGateway,
    max_body_bytes: usize,
    metrics: bool,
) -> Router {
    let state = State {
        gateway,
        timesource: Arc::new(timesource),
    };

    // Devices are configured with one of several push paths depending on firmware.
    let router = Router::new()
        .route("/health", get(ingest::health))
        .route("/", post(ingest::device_push))
        .route("/api/zkpush", post(ingest::device_push))
        .route("/push", post(ingest::device_push))
        .route("/device", post(ingest::device_push))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if !metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::warn!("failed to install prometheus recorder: {}", e);
            router
        }
    }
}
