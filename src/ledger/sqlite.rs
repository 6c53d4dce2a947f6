//! SQLite ledger
//!
//! One row per sentence in `sent_sentences`; the `sentence` column is the
//! primary key, so `INSERT OR IGNORE` is the atomic insert-if-absent. The
//! database runs in WAL mode with full sync, so a committed row survives a
//! crash and an interrupted insert is rolled back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

use super::{SentLedger, SentRecord};
use crate::error::{Result, TrackerError};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sent_sentences (
    sentence     TEXT PRIMARY KEY NOT NULL,
    payload_name TEXT NOT NULL,
    sent_at      TEXT NOT NULL,
    received_at  TEXT NOT NULL
)";

/// Durable ledger backed by a SQLite database file
pub struct SqliteLedger {
    path: PathBuf,
    pool: Pool<Sqlite>,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`
    ///
    /// # Errors
    ///
    /// Returns `Ledger` if the database cannot be opened or is not a valid
    /// ledger. Startup must stop then: running without the ledger would
    /// deliver sentences again.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        // Single writer; inserts are serialized by the pool
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| ledger_error(&path, "open", e))?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(|e| ledger_error(&path, "initialize", e))?;

        let ledger = Self { path, pool };
        info!(
            "Sent ledger {} holds {} sentences",
            ledger.path.display(),
            ledger.count().await?
        );
        Ok(ledger)
    }
}

#[async_trait]
impl SentLedger for SqliteLedger {
    async fn is_already_sent(&self, sentence: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM sent_sentences WHERE sentence = ?")
                .bind(sentence)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ledger_error(&self.path, "query", e))?;
        Ok(found.is_some())
    }

    async fn insert_if_absent(&self, record: SentRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sent_sentences (sentence, payload_name, sent_at, received_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.sentence)
        .bind(&record.payload_name)
        .bind(record.sent_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(record.received_at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error(&self.path, "insert into", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent_sentences")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ledger_error(&self.path, "count", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn ledger_error(path: &Path, action: &str, e: sqlx::Error) -> TrackerError {
    TrackerError::Ledger(format!("cannot {} {}: {}", action, path.display(), e))
}
