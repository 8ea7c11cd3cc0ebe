use std::future::{Future, IntoFuture};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::fallback::MemoryLog;
use crate::gateway::PersistenceGateway;
use crate::router;
use crate::store::postgres::PgDocumentStore;
use crate::store::{connect_with_retry, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// In-flight requests completed and the store was closed.
    Graceful,
    /// The grace period elapsed first.
    Forced,
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> ShutdownOutcome
where
    F: Future<Output = ()> + Send + 'static,
{
    let store: Arc<dyn DocumentStore + Send + Sync> = Arc::new(PgDocumentStore::new(
        &config.database_url,
        config.max_pg_connections,
        config.pg_acquire_timeout(),
    ));

    let fallback = match config.memory_fallback_capacity {
        0 => MemoryLog::new(),
        capacity => MemoryLog::with_capacity(capacity),
    };
    let gateway = PersistenceGateway::new(store.clone(), fallback, crate::time::SystemTime {});

    let app = router::router(
        crate::time::SystemTime {},
        gateway,
        config.max_body_bytes,
        config.export_prometheus,
    );

    serve_with_store(app, store, config, listener, shutdown).await
}

/// Runs `app` until `shutdown` resolves, while a background task keeps the
/// connection to `store` alive. After `shutdown`, draining in-flight requests
/// and closing the store must finish within the configured grace period.
pub async fn serve_with_store<F>(
    app: axum::Router,
    store: Arc<dyn DocumentStore + Send + Sync>,
    config: Config,
    listener: TcpListener,
    shutdown: F,
) -> ShutdownOutcome
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel_token = CancellationToken::new();

    let connector = tokio::spawn(connect_with_retry(
        store.clone(),
        config.reconnect_interval(),
        cancel_token.clone(),
    ));

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("listening on an unknown address: {}", e),
    }

    let signal_token = cancel_token.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutdown signal received, closing HTTP server");
            signal_token.cancel();
        })
        .into_future();

    let drain = async {
        if let Err(e) = server.await {
            tracing::error!("http server failed: {}", e);
        }
        tracing::info!("HTTP server closed");

        cancel_token.cancel();
        if let Err(e) = connector.await {
            tracing::error!("document store connector task failed: {}", e);
        }

        store.close().await;
        tracing::info!("document store connection closed");
    };

    let grace_period = config.shutdown_grace_period();
    let deadline = async {
        cancel_token.cancelled().await;
        tokio::time::sleep(grace_period).await;
    };

    let outcome = tokio::select! {
        _ = drain => ShutdownOutcome::Graceful,
        _ = deadline => {
            tracing::warn!("forcing shutdown after {:?} grace period", grace_period);
            ShutdownOutcome::Forced
        }
    };

    cancel_token.cancel();
    outcome
}
