//! Map service upload

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{http_client, Delivery, TelemetrySink};
use crate::error::{Result, TrackerError};

const SINK_NAME: &str = "map";

/// JSON body posted per delivery
#[derive(Debug, Serialize, PartialEq)]
pub struct MapPosition<'a> {
    pub id: &'a str,
    pub lat: f64,
    pub lon: f64,
    pub alt: u32,
    pub raw: &'a str,
}

impl<'a> From<&'a Delivery> for MapPosition<'a> {
    fn from(delivery: &'a Delivery) -> Self {
        Self {
            id: &delivery.delivery_id,
            lat: delivery.lat,
            lon: delivery.lon,
            alt: delivery.alt,
            raw: &delivery.sentence,
        }
    }
}

#[derive(Debug)]
pub struct MapSink {
    client: reqwest::Client,
    url: String,
}

impl MapSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(SINK_NAME, timeout)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TelemetrySink for MapSink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        let position = MapPosition::from(delivery);
        info!(
            "Posting {} to map: {:.5}, {:.5}, {} m",
            position.id, position.lat, position.lon, position.alt
        );

        let response = self
            .client
            .post(&self.url)
            .json(&position)
            .send()
            .await
            .map_err(|e| TrackerError::SinkDelivery {
                sink: SINK_NAME,
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TrackerError::SinkDelivery {
                sink: SINK_NAME,
                reason: format!("unexpected status {}", response.status()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_position_body() {
        let delivery = Delivery {
            payload_name: "SA6BSS-11".to_string(),
            delivery_id: "SA6BSS-11".to_string(),
            sentence: "$$SA6BSS-11,1*00".to_string(),
            received_at: Utc.with_ymd_and_hms(2018, 6, 1, 5, 44, 0).unwrap(),
            lat: 55.75,
            lon: 62.0,
            alt: 8900,
        };

        let body = serde_json::to_value(MapPosition::from(&delivery)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "id": "SA6BSS-11",
                "lat": 55.75,
                "lon": 62.0,
                "alt": 8900,
                "raw": "$$SA6BSS-11,1*00",
            })
        );
    }
}
