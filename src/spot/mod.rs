//! # Spot Module
//!
//! Canonical WSPR reception reports and the machinery around them.
//!
//! This module handles:
//! - Mapping raw rows from either source layout into [`Spot`] records
//! - Classifying spots as balloon position reports or telemetry-channel reports
//! - Keeping a rolling, deduplicated, age-bounded window of recent spots
//! - Optionally persisting spots between runs

pub mod cache;
pub mod filter;
pub mod normalizer;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reception report: station `rx_call` heard `tx_call` at `timestamp`.
///
/// Spots are never mutated once built. The only derived variant is the
/// 4-character home locator produced by [`filter::balloon_filter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spot {
    /// Reception time (UTC, minute resolution)
    pub timestamp: DateTime<Utc>,
    /// Transmitting callsign
    pub tx_call: String,
    /// Frequency in MHz, kept as reported (used for band prefix matching)
    pub freq_mhz: String,
    /// Signal to noise ratio in dB
    pub snr_db: i32,
    /// Drift in Hz/minute
    pub drift_hz_per_min: i32,
    /// Transmitter locator (4 or 6 characters)
    pub tx_locator: String,
    /// Reported transmit power in dBm
    pub power_dbm: i32,
    /// Reporting station
    pub rx_call: String,
    /// Reporting station locator
    pub rx_locator: String,
    /// Approximate distance in km
    pub distance_km: i32,
}

impl Spot {
    /// Ordering key used by every sorted spot list: time first, then callsign.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.tx_call.as_str())
    }
}

/// Sort spots ascending by `(timestamp, tx_call)`.
///
/// Trim, dedupe and correlation all require this ordering.
pub fn sort_spots(spots: &mut [Spot]) {
    spots.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Whether `spots` is ascending by timestamp.
pub fn is_time_sorted(spots: &[Spot]) -> bool {
    spots.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}


#[cfg(test)]
mod tests {
    use super::testing::spot_at;
    use super::*;

    #[test]
    fn test_sort_spots_by_time_then_call() {
        let mut spots = vec![
            spot_at(5, 46, "Q11DCN"),
            spot_at(5, 44, "SA6BSS"),
            spot_at(5, 44, "DL1ABC"),
        ];
        sort_spots(&mut spots);

        assert_eq!(spots[0].tx_call, "DL1ABC");
        assert_eq!(spots[1].tx_call, "SA6BSS");
        assert_eq!(spots[2].tx_call, "Q11DCN");
        assert!(is_time_sorted(&spots));
    }

    #[test]
    fn test_unsorted_detected() {
        let spots = vec![spot_at(5, 46, "A"), spot_at(5, 44, "B")];
        assert!(!is_time_sorted(&spots));
    }
}
