//! Habitat listener upload
//!
//! The sentence (newline terminated) is base64 encoded into a
//! `payload_telemetry` document and PUT to `{url}/{id}`, where `id` is the
//! SHA-256 hex digest of the base64 text. The server answers 201 for a new
//! document and 403 when another listener already uploaded it; both count
//! as delivered.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{http_client, Delivery, TelemetrySink};
use crate::error::{Result, TrackerError};

const SINK_NAME: &str = "habitat";

pub struct HabitatSink {
    client: reqwest::Client,
    url: String,
    callsign: String,
}

impl std::fmt::Debug for HabitatSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HabitatSink")
            .field("url", &self.url)
            .field("callsign", &self.callsign)
            .finish_non_exhaustive()
    }
}

impl HabitatSink {
    /// Create a sink uploading as listener `callsign`
    pub fn new(url: &str, callsign: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(SINK_NAME, timeout)?,
            url: url.trim_end_matches('/').to_string(),
            callsign: callsign.to_string(),
        })
    }
}

/// Build the listener document for `sentence`
///
/// # Returns
///
/// * `(String, Value)` - Document id and JSON body
pub fn habitat_document(
    sentence: &str,
    callsign: &str,
    created: DateTime<Utc>,
    uploaded: DateTime<Utc>,
) -> (String, Value) {
    let mut raw = sentence.to_string();
    if !raw.ends_with('\n') {
        raw.push('\n');
    }

    let encoded = STANDARD.encode(raw.as_bytes());
    let doc_id = hex::encode(Sha256::digest(encoded.as_bytes()));

    let mut receivers = serde_json::Map::new();
    receivers.insert(
        callsign.to_string(),
        json!({
            "time_created": created.to_rfc3339_opts(SecondsFormat::Secs, true),
            "time_uploaded": uploaded.to_rfc3339_opts(SecondsFormat::Micros, true),
        }),
    );

    let body = json!({
        "type": "payload_telemetry",
        "data": { "_raw": encoded },
        "receivers": receivers,
    });

    (doc_id, body)
}

#[async_trait]
impl TelemetrySink for HabitatSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        let (doc_id, body) =
            habitat_document(&delivery.sentence, &self.callsign, delivery.received_at, Utc::now());

        let response = self
            .client
            .put(format!("{}/{}", self.url, doc_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| TrackerError::SinkDelivery {
                sink: SINK_NAME,
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::CREATED => {
                info!("Habitat accepted {}", delivery.sentence);
                Ok(())
            }
            StatusCode::FORBIDDEN => {
                info!("Habitat already has {}", delivery.sentence);
                Ok(())
            }
            status => Err(TrackerError::SinkDelivery {
                sink: SINK_NAME,
                reason: format!("unexpected status {}", status),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SENTENCE: &str = "$$SA6BSS-11,1527831840,05:44,55.75000,62.00000,8900,60,-25.40,3.10,0,1*6f";

    fn times() -> (DateTime<Utc>, DateTime<Utc>) {
        let created = Utc.with_ymd_and_hms(2018, 6, 1, 5, 44, 0).unwrap();
        let uploaded = Utc.with_ymd_and_hms(2018, 6, 1, 5, 52, 7).unwrap();
        (created, uploaded)
    }

    #[test]
    fn test_document_layout() {
        let (created, uploaded) = times();
        let (doc_id, body) = habitat_document(SENTENCE, "SA6BSS", created, uploaded);

        assert_eq!(
            doc_id,
            "ad294f9a39b9aa9f45fa0b8dfbb91969f3588e8e6f3435d67069c189b8467678"
        );
        assert_eq!(body["type"], "payload_telemetry");
        assert_eq!(
            body["data"]["_raw"],
            "JCRTQTZCU1MtMTEsMTUyNzgzMTg0MCwwNTo0NCw1NS43NTAwMCw2Mi4wMDAwMCw4OTAwLDYwLC0yNS40MCwzLjEwLDAsMSo2Zgo="
        );
        assert_eq!(body["receivers"]["SA6BSS"]["time_created"], "2018-06-01T05:44:00Z");
        assert_eq!(
            body["receivers"]["SA6BSS"]["time_uploaded"],
            "2018-06-01T05:52:07.000000Z"
        );
    }

    #[test]
    fn test_trailing_newline_not_doubled() {
        let (created, uploaded) = times();
        let (plain_id, _) = habitat_document(SENTENCE, "SA6BSS", created, uploaded);
        let (terminated_id, _) =
            habitat_document(&format!("{}\n", SENTENCE), "SA6BSS", created, uploaded);

        assert_eq!(plain_id, terminated_id);
    }

    #[test]
    fn test_document_id_independent_of_listener() {
        let (created, uploaded) = times();
        let (a, _) = habitat_document(SENTENCE, "SA6BSS", created, uploaded);
        let (b, _) = habitat_document(SENTENCE, "LA9JO", created, uploaded);

        assert_eq!(a, b);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let sink = HabitatSink::new("http://localhost/add_listener/", "SA6BSS", Duration::from_secs(1))
            .unwrap();
        assert_eq!(sink.url, "http://localhost/add_listener");
        assert_eq!(sink.name(), "habitat");
    }
}
