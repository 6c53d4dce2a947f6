//! # Sent Ledger Module
//!
//! Durable record of every sentence already delivered.
//!
//! The existence of a record for a sentence is the only idempotency signal:
//! a sentence is delivered downstream only by the caller that inserted its
//! record. Check and insert are one atomic operation, so concurrent callers
//! cannot both win.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// One delivered sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRecord {
    pub payload_name: String,
    /// Wall clock time of delivery
    pub sent_at: DateTime<Utc>,
    /// Time of the original position spot
    pub received_at: DateTime<Utc>,
    pub sentence: String,
}

impl SentRecord {
    /// Record stamped with the current wall clock
    pub fn now(payload_name: &str, received_at: DateTime<Utc>, sentence: &str) -> Self {
        Self {
            payload_name: payload_name.to_string(),
            sent_at: Utc::now(),
            received_at,
            sentence: sentence.to_string(),
        }
    }
}

/// Append-only set of sent sentences
#[async_trait]
pub trait SentLedger: Send + Sync {
    /// Exact-string lookup
    async fn is_already_sent(&self, sentence: &str) -> Result<bool>;

    /// Atomically insert `record` unless its sentence is already present
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Record inserted and durable; the caller owns delivery
    /// * `Ok(false)` - Sentence was already recorded
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if the record could not be made durable. The
    /// sentence is then not marked as sent.
    async fn insert_if_absent(&self, record: SentRecord) -> Result<bool>;

    /// Record a sentence; a second record of the same sentence is a no-op
    async fn record(&self, record: SentRecord) -> Result<()> {
        self.insert_if_absent(record).await.map(|_| ())
    }

    /// Number of recorded sentences
    async fn count(&self) -> Result<usize>;
}
