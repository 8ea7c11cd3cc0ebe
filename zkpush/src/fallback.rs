use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::record::StoredRecord;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FallbackError {
    #[error("memory storage is full ({0} records)")]
    Full(usize),
    #[error("memory storage lock is poisoned")]
    Poisoned,
}

/// Records that could not reach the document store, kept for the lifetime of the
/// process. Appends from concurrent requests are serialized by the mutex, their
/// relative order is meaningless. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<StoredRecord>>>,
    capacity: Option<usize>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that refuses records past `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Default::default(),
            capacity: Some(capacity),
        }
    }

    /// Appends a record and returns the resulting number of records.
    pub fn append(&self, record: StoredRecord) -> Result<usize, FallbackError> {
        let mut records = self.records.lock().map_err(|_| FallbackError::Poisoned)?;

        if let Some(capacity) = self.capacity {
            if records.len() >= capacity {
                return Err(FallbackError::Full(capacity));
            }
        }

        records.push(record);
        Ok(records.len())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every record appended so far, oldest first.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .lock()
            .map_or_else(|_| Vec::new(), |records| records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DeviceCode, LogRecord};
    use serde_json::json;

    fn stored(id: &str) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            record: LogRecord {
                serial_number: "SN".to_string(),
                pin: "1".to_string(),
                verified: DeviceCode::Code(0),
                status: DeviceCode::Code(0),
                date_time: "2024-01-01 08:00:00".to_string(),
                raw_data: json!({}),
            },
        }
    }

    #[test]
    fn appends_in_order() {
        let log = MemoryLog::new();
        assert!(log.is_empty());

        assert_eq!(log.append(stored("1")), Ok(1));
        assert_eq!(log.append(stored("2")), Ok(2));

        let ids: Vec<String> = log.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn clones_share_storage() {
        let log = MemoryLog::new();
        let other = log.clone();

        other.append(stored("1")).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn refuses_records_past_capacity() {
        let log = MemoryLog::with_capacity(1);

        assert_eq!(log.append(stored("1")), Ok(1));
        assert_eq!(log.append(stored("2")), Err(FallbackError::Full(1)));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_all_kept() {
        let log = MemoryLog::new();

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move { log.append(stored(&i.to_string())) })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(log.len(), 64);
    }
}
