use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::fallback::MemoryLog;
use crate::prometheus::{
    report_dropped_record, report_fallback_size, report_primary_failure, report_stored_record,
};
use crate::record::{LogRecord, StoredRecord};
use crate::store::{ConnectionState, DocumentStore};
use crate::time::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Primary,
    Fallback,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Primary => "primary",
            StorageKind::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Stored { id: String, storage: StorageKind },
    Dropped { error: String },
}

impl SaveOutcome {
    pub fn success(&self) -> bool {
        matches!(self, SaveOutcome::Stored { .. })
    }
}

/// Writes records to the document store when it is connected, and to the
/// in-memory log otherwise or when the write fails. Never returns an error.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn DocumentStore + Send + Sync>,
    fallback: MemoryLog,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl PersistenceGateway {
    pub fn new<T>(
        store: Arc<dyn DocumentStore + Send + Sync>,
        fallback: MemoryLog,
        timesource: T,
    ) -> Self
    where
        T: TimeSource + Send + Sync + 'static,
    {
        Self {
            store,
            fallback,
            timesource: Arc::new(timesource),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    pub fn fallback(&self) -> &MemoryLog {
        &self.fallback
    }

    #[instrument(skip_all, fields(pin = %record.pin))]
    pub async fn save(&self, record: LogRecord) -> SaveOutcome {
        if self.store.connection_state() == ConnectionState::Connected {
            match self.store.insert(&record).await {
                Ok(id) => {
                    info!(%id, "record saved to document store");
                    report_stored_record(StorageKind::Primary);
                    return SaveOutcome::Stored {
                        id,
                        storage: StorageKind::Primary,
                    };
                }
                Err(e) => {
                    error!("document store insert failed, falling back: {}", e);
                    report_primary_failure();
                }
            }
        }

        self.save_to_memory(record)
    }

    fn save_to_memory(&self, record: LogRecord) -> SaveOutcome {
        // Millisecond ids may collide under concurrent load.
        let id = self.timesource.current_millis().to_string();

        match self.fallback.append(StoredRecord {
            id: id.clone(),
            record,
        }) {
            Ok(size) => {
                info!(%id, "record saved to memory storage");
                report_stored_record(StorageKind::Fallback);
                report_fallback_size(size);
                SaveOutcome::Stored {
                    id,
                    storage: StorageKind::Fallback,
                }
            }
            Err(e) => {
                warn!("memory storage refused record, dropping it: {}", e);
                report_dropped_record();
                SaveOutcome::Dropped {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DeviceCode;
    use crate::store::mock::MockDocumentStore;
    use serde_json::json;

    #[derive(Clone)]
    struct FixedTime;

    impl TimeSource for FixedTime {
        fn current_time(&self) -> String {
            "2025-07-01T11:00:00Z".to_string()
        }

        fn current_millis(&self) -> i128 {
            1_751_367_600_000
        }
    }

    fn record(pin: &str) -> LogRecord {
        LogRecord {
            serial_number: "SN".to_string(),
            pin: pin.to_string(),
            verified: DeviceCode::Code(1),
            status: DeviceCode::Code(0),
            date_time: "2024-01-01 08:00:00".to_string(),
            raw_data: json!({"PIN": pin}),
        }
    }

    fn gateway(store: &MockDocumentStore, fallback: MemoryLog) -> PersistenceGateway {
        PersistenceGateway::new(Arc::new(store.clone()), fallback, FixedTime)
    }

    #[tokio::test]
    async fn saves_to_the_store_when_connected() {
        let store = MockDocumentStore::connected();
        let gateway = gateway(&store, MemoryLog::new());

        let outcome = gateway.save(record("1")).await;

        assert_eq!(
            outcome,
            SaveOutcome::Stored {
                id: "mock-1".to_string(),
                storage: StorageKind::Primary
            }
        );
        assert_eq!(store.documents().len(), 1);
        assert!(gateway.fallback().is_empty());
    }

    #[tokio::test]
    async fn falls_back_when_disconnected() {
        let store = MockDocumentStore::new();
        let gateway = gateway(&store, MemoryLog::new());

        let outcome = gateway.save(record("1")).await;

        assert_eq!(
            outcome,
            SaveOutcome::Stored {
                id: "1751367600000".to_string(),
                storage: StorageKind::Fallback
            }
        );
        assert_eq!(store.connect_attempts(), 0);

        let kept = gateway.fallback().records();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1751367600000");
        assert_eq!(kept[0].record, record("1"));
    }

    #[tokio::test]
    async fn falls_back_when_the_insert_fails() {
        let store = MockDocumentStore::connected().failing_inserts();
        let gateway = gateway(&store, MemoryLog::new());

        let outcome = gateway.save(record("1")).await;

        assert!(matches!(
            outcome,
            SaveOutcome::Stored {
                storage: StorageKind::Fallback,
                ..
            }
        ));
        assert!(store.documents().is_empty());
        assert_eq!(gateway.fallback().len(), 1);
    }

    #[tokio::test]
    async fn stops_waiting_on_the_store_once_the_connection_is_lost() {
        let store = MockDocumentStore::connected().losing_connection();
        let gateway = gateway(&store, MemoryLog::new());

        for pin in ["1", "2", "3"] {
            let outcome = gateway.save(record(pin)).await;
            assert!(matches!(
                outcome,
                SaveOutcome::Stored {
                    storage: StorageKind::Fallback,
                    ..
                }
            ));
        }

        assert_eq!(gateway.connection_state(), ConnectionState::Disconnected);
        assert_eq!(store.insert_attempts(), 1);
        assert_eq!(gateway.fallback().len(), 3);
    }

    #[tokio::test]
    async fn resumes_primary_storage_after_reconnecting() {
        let store = MockDocumentStore::new();
        let gateway = gateway(&store, MemoryLog::new());

        gateway.save(record("1")).await;
        store.set_connected(true);
        let outcome = gateway.save(record("2")).await;

        assert!(matches!(
            outcome,
            SaveOutcome::Stored {
                storage: StorageKind::Primary,
                ..
            }
        ));
        assert_eq!(gateway.fallback().len(), 1);
        assert_eq!(store.documents().len(), 1);
    }

    #[tokio::test]
    async fn drops_the_record_when_memory_storage_is_full() {
        let store = MockDocumentStore::new();
        let gateway = gateway(&store, MemoryLog::with_capacity(1));

        assert!(gateway.save(record("1")).await.success());
        let outcome = gateway.save(record("2")).await;

        assert!(!outcome.success());
        assert_eq!(
            outcome,
            SaveOutcome::Dropped {
                error: "memory storage is full (1 records)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn does_not_deduplicate() {
        let store = MockDocumentStore::new();
        let gateway = gateway(&store, MemoryLog::new());

        gateway.save(record("1")).await;
        gateway.save(record("1")).await;

        assert_eq!(gateway.fallback().len(), 2);
    }
}
