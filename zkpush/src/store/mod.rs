use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::prometheus::report_connect_attempt;
use crate::record::LogRecord;

pub mod mock;
pub mod postgres;

/// Enumeration of errors for operations with a DocumentStore.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document store is not connected")]
    NotConnected,
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("failed to serialize record: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl StoreError {
    /// Wraps a failed query, telling apart failures to reach the database from
    /// failures of the statement itself.
    pub fn from_query(command: &str, error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::ConnectionError { error },
            error => StoreError::QueryError {
                command: command.to_owned(),
                error,
            },
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::NotConnected | StoreError::ConnectionError { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// The primary persistence target for attendance records.
#[async_trait]
pub trait DocumentStore {
    fn connection_state(&self) -> ConnectionState;

    /// Make a single connection attempt. When a connection was established
    /// before, this checks that the database is reachable again.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Insert a record and return the identifier the store assigned to it.
    /// A connection error moves the store to `Disconnected`.
    async fn insert(&self, record: &LogRecord) -> Result<String, StoreError>;

    async fn close(&self);
}

/// Supervises the connection of `store` until `cancel_token` is triggered.
/// Every `retry_interval` the store is checked, and a connection attempt is
/// made whenever it is `Disconnected`, including after an outage. Caller
/// should spawn this. Returns the state the store was left in.
pub async fn connect_with_retry(
    store: Arc<dyn DocumentStore + Send + Sync>,
    retry_interval: Duration,
    cancel_token: CancellationToken,
) -> ConnectionState {
    loop {
        if store.connection_state() == ConnectionState::Disconnected {
            info!("attempting document store connection");

            let attempt = tokio::select! {
                _ = cancel_token.cancelled() => None,
                result = store.connect() => Some(result),
            };

            match attempt {
                None => break,
                Some(Ok(())) => {
                    report_connect_attempt("success");
                    info!("document store connected");
                }
                Some(Err(e)) => {
                    report_connect_attempt("failure");
                    error!(
                        error = %e,
                        "document store connection failed, retrying in {:?}", retry_interval
                    );
                }
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }

    info!("document store connector shutting down");
    store.connection_state()
}
