//! # Spot Normalizer
//!
//! Maps raw rows from the live query page or from a wsprnet archive file into
//! canonical [`Spot`] records.
//!
//! ## Column Layouts
//!
//! | Field | Live | Archive |
//! |-------|------|---------|
//! | timestamp | 0 (`YYYY-MM-DD HH:MM`) | 1 (Unix epoch) |
//! | tx_call | 1 | 6 |
//! | freq | 2 | 5 |
//! | snr | 3 | 4 |
//! | drift | 4 | 9 |
//! | tx_locator | 5 | 7 |
//! | power | 6 (`+13`) | 8 |
//! | rx_call | 8 | 2 |
//! | rx_locator | 9 | 3 |
//! | distance | 10 | 10 |

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};

use super::Spot;
use crate::error::{Result, TrackerError};

/// One raw row as delivered by a spot source
pub type RawRow = Vec<String>;

/// Declared position of every canonical field within a raw row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub timestamp: usize,
    pub tx_call: usize,
    pub freq: usize,
    pub snr: usize,
    pub drift: usize,
    pub tx_locator: usize,
    pub power: usize,
    pub rx_call: usize,
    pub rx_locator: usize,
    pub distance: usize,
}

/// Row layout produced by a spot source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    /// HTML table of the live query page (watts and miles columns present)
    Live,
    /// wsprnet archive CSV
    Archive,
}

impl SourceLayout {
    /// Column mapping for this layout
    pub const fn column_map(self) -> ColumnMap {
        match self {
            SourceLayout::Live => ColumnMap {
                timestamp: 0,
                tx_call: 1,
                freq: 2,
                snr: 3,
                drift: 4,
                tx_locator: 5,
                power: 6,
                rx_call: 8,
                rx_locator: 9,
                distance: 10,
            },
            SourceLayout::Archive => ColumnMap {
                timestamp: 1,
                tx_call: 6,
                freq: 5,
                snr: 4,
                drift: 9,
                tx_locator: 7,
                power: 8,
                rx_call: 2,
                rx_locator: 3,
                distance: 10,
            },
        }
    }
}

/// Normalize one raw row
///
/// # Errors
///
/// Returns `MalformedSpot` if a mapped column is missing or fails coercion.
/// Callers drop the row and continue.
pub fn normalize(row: &[String], map: &ColumnMap) -> Result<Spot> {
    Ok(Spot {
        timestamp: parse_timestamp(field(row, map.timestamp, "timestamp")?)?,
        tx_call: required_text(row, map.tx_call, "tx_call")?,
        freq_mhz: parse_frequency(field(row, map.freq, "freq")?)?,
        snr_db: parse_int(field(row, map.snr, "snr")?, "snr")?,
        drift_hz_per_min: parse_int(field(row, map.drift, "drift")?, "drift")?,
        tx_locator: required_text(row, map.tx_locator, "tx_locator")?,
        power_dbm: parse_int(field(row, map.power, "power")?, "power")?,
        rx_call: required_text(row, map.rx_call, "rx_call")?,
        rx_locator: field(row, map.rx_locator, "rx_locator")?.trim().to_string(),
        distance_km: parse_int(field(row, map.distance, "distance")?, "distance")?,
    })
}

/// Normalize a batch, dropping malformed rows
///
/// # Returns
///
/// * `(Vec<Spot>, usize)` - Normalized spots (input order) and number of dropped rows
pub fn normalize_all(rows: &[RawRow], layout: SourceLayout) -> (Vec<Spot>, usize) {
    let map = layout.column_map();
    let mut spots = Vec::with_capacity(rows.len());
    let mut dropped = 0;

    for row in rows {
        match normalize(row, &map) {
            Ok(spot) => spots.push(spot),
            Err(e) => {
                tracing::debug!("Dropping row {:?}: {}", row, e);
                dropped += 1;
            }
        }
    }

    (spots, dropped)
}

fn field<'a>(row: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| TrackerError::MalformedSpot(format!("missing column {} ({})", index, name)))
}

fn required_text(row: &[String], index: usize, name: &str) -> Result<String> {
    let value = field(row, index, name)?.trim();
    if value.is_empty() {
        return Err(TrackerError::MalformedSpot(format!("empty {}", name)));
    }
    Ok(value.to_string())
}

/// Integer coercion; a leading `+` (as in `+13` dBm) is stripped
fn parse_int(value: &str, name: &str) -> Result<i32> {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .parse::<i32>()
        .map_err(|_| TrackerError::MalformedSpot(format!("{} is not an integer: {:?}", name, value)))
}

fn parse_frequency(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.parse::<f64>().is_err() {
        return Err(TrackerError::MalformedSpot(format!("frequency is not numeric: {:?}", value)));
    }
    Ok(trimmed.to_string())
}

/// Naive forms, read as UTC; a trailing `Z` is stripped first
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a Unix epoch or an ISO 8601 timestamp, truncated to the minute
///
/// Accepts RFC 3339 with any offset, and date-time forms with a space or `T`
/// separator and optional seconds, with or without a `Z` suffix.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    let parsed = if let Ok(epoch) = trimmed.parse::<i64>() {
        Utc.timestamp_opt(epoch, 0).single()
    } else if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        Some(ts.with_timezone(&Utc))
    } else {
        let naive = trimmed.strip_suffix('Z').unwrap_or(trimmed);
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
            .map(|naive| naive.and_utc())
    };

    parsed
        .and_then(|ts| ts.with_second(0))
        .and_then(|ts| ts.with_nanosecond(0))
        .ok_or_else(|| TrackerError::MalformedSpot(format!("unparseable timestamp: {:?}", value)))
}
