use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::record::{LogRecord, StoredRecord};
use crate::store::{ConnectionState, DocumentStore, StoreError};

#[derive(Default)]
struct MockState {
    connected: bool,
    failing_connects: usize,
    failing_inserts: bool,
    losing_connection: bool,
    connect_attempts: usize,
    insert_attempts: usize,
    documents: Vec<StoredRecord>,
}

/// In-process stand-in for the document store, for tests and local runs.
/// Clones share state.
#[derive(Clone, Default)]
pub struct MockDocumentStore {
    state: Arc<Mutex<MockState>>,
}

impl MockDocumentStore {
    /// A store that has not connected yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that is already connected and accepts inserts.
    pub fn connected() -> Self {
        let store = Self::default();
        store.set_connected(true);
        store
    }

    /// The next `attempts` calls to `connect` fail.
    pub fn failing_connects(self, attempts: usize) -> Self {
        self.lock().failing_connects = attempts;
        self
    }

    /// Every insert is rejected by the database.
    pub fn failing_inserts(self) -> Self {
        self.lock().failing_inserts = true;
        self
    }

    /// The next insert cannot reach the database and drops the connection.
    pub fn losing_connection(self) -> Self {
        self.lock().losing_connection = true;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn insert_attempts(&self) -> usize {
        self.lock().insert_attempts
    }

    pub fn documents(&self) -> Vec<StoredRecord> {
        self.lock().documents.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("poisoned mock store mutex")
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    fn connection_state(&self) -> ConnectionState {
        match self.lock().connected {
            true => ConnectionState::Connected,
            false => ConnectionState::Disconnected,
        }
    }

    async fn connect(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.connect_attempts += 1;

        if state.connected {
            return Ok(());
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(StoreError::ConnectionError {
                error: sqlx::Error::PoolTimedOut,
            });
        }

        state.connected = true;
        Ok(())
    }

    async fn insert(&self, record: &LogRecord) -> Result<String, StoreError> {
        let mut state = self.lock();
        state.insert_attempts += 1;

        if !state.connected {
            return Err(StoreError::NotConnected);
        }
        if state.losing_connection {
            state.losing_connection = false;
            state.connected = false;
            return Err(StoreError::from_query("INSERT", sqlx::Error::PoolTimedOut));
        }
        if state.failing_inserts {
            return Err(StoreError::from_query(
                "INSERT",
                sqlx::Error::Protocol("insert rejected".to_owned()),
            ));
        }

        let id = format!("mock-{}", state.documents.len() + 1);
        state.documents.push(StoredRecord {
            id: id.clone(),
            record: record.clone(),
        });
        Ok(id)
    }

    async fn close(&self) {
        self.set_connected(false);
    }
}
