//! # Telemetry Sink Module
//!
//! Downstream consumers of decoded telemetry.
//!
//! - [`HabitatSink`]: PUTs the sentence as a habitat `payload_telemetry` document
//! - [`MapSink`]: POSTs the position and the raw sentence to a map service
//!
//! Sinks are only called for sentences that were newly recorded in the sent
//! ledger. A failed delivery is reported and never retried.

pub mod habitat;
pub mod map;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use habitat::HabitatSink;
pub use map::MapSink;

/// One decoded sentence ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub payload_name: String,
    /// Identifier of the payload on the map service
    pub delivery_id: String,
    pub sentence: String,
    /// Time of the position spot
    pub received_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub alt: u32,
}

/// A downstream telemetry consumer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Deliver one sentence
    ///
    /// # Errors
    ///
    /// Returns `SinkDelivery` if the consumer rejected or could not be reached
    async fn deliver(&self, delivery: &Delivery) -> Result<()>;
}

fn http_client(sink: &'static str, timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| crate::error::TrackerError::SinkDelivery {
            sink,
            reason: format!("cannot build HTTP client: {}", e),
        })
}
