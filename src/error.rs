//! # Error Types
//!
//! Custom error types for WSPR Tracker using `thiserror`.

use thiserror::Error;

/// Main error type for WSPR Tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors (ledger, spot store)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A raw row could not be coerced into a spot. The row is dropped.
    #[error("Malformed spot: {0}")]
    MalformedSpot(String),

    /// Telemetry power is not one of the 19 standard levels
    #[error("Power {0} dBm is not a standard WSPR power level")]
    PowerLookup(i32),

    /// Telemetry callsign or locator cannot be indexed by the decoder
    #[error("Malformed telemetry spot: {0}")]
    MalformedTelemetry(String),

    /// Fetching raw rows from the spot source failed
    #[error("Spot source fetch failed: {0}")]
    SourceFetch(String),

    /// Pushing a sentence to a downstream sink failed
    #[error("Delivery to {sink} failed: {reason}")]
    SinkDelivery { sink: &'static str, reason: String },

    /// The durable sent ledger could not be read or written
    #[error("Ledger error: {0}")]
    Ledger(String),
}

/// Result type alias for WSPR Tracker
pub type Result<T> = std::result::Result<T, TrackerError>;
