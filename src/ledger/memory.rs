//! In-memory ledger (not durable)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{SentLedger, SentRecord};
use crate::error::{Result, TrackerError};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, SentRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded entry for `sentence`
    pub fn get(&self, sentence: &str) -> Option<SentRecord> {
        self.records.lock().ok()?.get(sentence).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SentRecord>>> {
        self.records
            .lock()
            .map_err(|_| TrackerError::Ledger("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl SentLedger for MemoryLedger {
    async fn is_already_sent(&self, sentence: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(sentence))
    }

    async fn insert_if_absent(&self, record: SentRecord) -> Result<bool> {
        let mut records = self.lock()?;
        if records.contains_key(&record.sentence) {
            return Ok(false);
        }
        records.insert(record.sentence.clone(), record);
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_first_record_kept() {
        let ledger = MemoryLedger::new();
        let received = Utc.with_ymd_and_hms(2018, 6, 1, 5, 44, 0).unwrap();

        assert!(ledger.insert_if_absent(SentRecord::now("A", received, "$$X*58")).await.unwrap());
        assert!(!ledger.insert_if_absent(SentRecord::now("B", received, "$$X*58")).await.unwrap());

        assert_eq!(ledger.get("$$X*58").unwrap().payload_name, "A");
        assert_eq!(ledger.count().await.unwrap(), 1);
    }
}
