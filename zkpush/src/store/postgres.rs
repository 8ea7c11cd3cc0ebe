use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::{Json, Uuid};
use tokio::sync::{OnceCell, SetError};
use tracing::{info, warn};

use crate::record::LogRecord;
use crate::store::{ConnectionState, DocumentStore, StoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attendance_logs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const INSERT_DOCUMENT: &str = r#"
INSERT INTO attendance_logs
    (document)
VALUES
    ($1)
RETURNING
    id
"#;

/// Attendance records kept as JSONB documents in a PostgreSQL table.
///
/// The pool is created by the first successful `connect` and kept for the rest
/// of the process lifetime. An insert that cannot reach the database marks the
/// store unhealthy, which reports `Disconnected` until a later `connect`
/// acquires a connection again.
pub struct PgDocumentStore {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
    pool: OnceCell<PgPool>,
    healthy: AtomicBool,
}

impl PgDocumentStore {
    pub fn new(url: &str, max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            url: url.to_owned(),
            max_connections,
            acquire_timeout,
            pool: OnceCell::new(),
            healthy: AtomicBool::new(false),
        }
    }

    fn pool(&self) -> Option<&PgPool> {
        self.pool.get().filter(|pool| !pool.is_closed())
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn connection_state(&self) -> ConnectionState {
        match self.pool() {
            Some(_) if self.healthy.load(Ordering::Acquire) => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if let Some(pool) = self.pool() {
            pool.acquire()
                .await
                .map_err(|error| StoreError::ConnectionError { error })?;
            self.set_healthy(true);
            return Ok(());
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "CREATE TABLE".to_owned(),
                error,
            })?;

        info!(
            max_connections = self.max_connections,
            "postgres pool ready"
        );

        // A concurrent attempt may have won; its pool is as good as ours.
        match self.pool.set(pool) {
            Ok(()) => {}
            Err(SetError::AlreadyInitializedError(pool))
            | Err(SetError::InitializingError(pool)) => pool.close().await,
        }
        self.set_healthy(true);
        Ok(())
    }

    async fn insert(&self, record: &LogRecord) -> Result<String, StoreError> {
        let pool = self.pool().ok_or(StoreError::NotConnected)?;
        let document = serde_json::to_value(record)?;

        let id: Uuid = sqlx::query_scalar(INSERT_DOCUMENT)
            .bind(Json(document))
            .fetch_one(pool)
            .await
            .map_err(|error| {
                let error = StoreError::from_query("INSERT", error);
                if error.is_connection_error() {
                    warn!("lost connection to postgres: {}", error);
                    self.set_healthy(false);
                }
                error
            })?;

        Ok(id.to_string())
    }

    async fn close(&self) {
        self.set_healthy(false);
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("postgres pool closed");
        }
    }
}
