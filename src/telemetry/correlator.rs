//! # Correlator
//!
//! Pairs each balloon position spot with the telemetry-channel spot sent right
//! after it.
//!
//! For a position spot at `T`, every candidate with `T <= t < T + 8 min` is
//! collected and the earliest one is used. Candidates are scanned in ascending
//! order, so the scan stops at the first candidate 8 minutes or more past `T`.
//!
//! The correlator keeps no memory between passes. A position spot still in
//! the window is paired again next cycle; the sent ledger stops the repeat.

use chrono::{Duration, Timelike};

use crate::config::BalloonConfig;
use crate::spot::filter::{classify, is_position_spot, Channel};
use crate::spot::{is_time_sorted, Spot};

/// Width of the pairing window in minutes
pub const PAIRING_WINDOW_MIN: i64 = 8;

/// A position spot and its representative telemetry spot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing<'a> {
    pub position: &'a Spot,
    pub telemetry: &'a Spot,
    /// Number of candidates inside the window
    pub candidates: usize,
}

/// Telemetry candidates of `balloon`: its channel, band and timeslot
pub fn telemetry_candidates<'a>(spots: &'a [Spot], balloon: &BalloonConfig) -> Vec<&'a Spot> {
    let channel = Channel::new(balloon.channel);
    let band_prefix = format!("{}.", balloon.band_mhz);

    spots
        .iter()
        .filter(|s| channel.is_some() && classify(&s.tx_call) == channel)
        .filter(|s| s.freq_mhz.starts_with(&band_prefix))
        .filter(|s| balloon.timeslot.matches_minute(s.timestamp.minute()))
        .collect()
}

/// Position spots of `balloon`, one per distinct timestamp (first wins)
pub fn position_spots<'a>(spots: &'a [Spot], balloon: &BalloonConfig) -> Vec<&'a Spot> {
    let mut positions: Vec<&Spot> = spots.iter().filter(|s| is_position_spot(s, balloon)).collect();
    positions.dedup_by(|next, kept| next.timestamp == kept.timestamp);
    positions
}

/// Pair every position spot of `balloon` with its telemetry spot
///
/// `spots` must be ascending by timestamp.
pub fn correlate<'a>(spots: &'a [Spot], balloon: &BalloonConfig) -> Vec<Pairing<'a>> {
    debug_assert!(is_time_sorted(spots), "correlate requires ascending spots");

    let telemetry = telemetry_candidates(spots, balloon);
    if telemetry.is_empty() {
        tracing::debug!("{}: no telemetry candidates, skipping", balloon.name);
        return Vec::new();
    }

    let positions = position_spots(spots, balloon);
    tracing::info!(
        "{}: found {} balloon spots and {} possible telemetry packets",
        balloon.name,
        positions.len(),
        telemetry.len()
    );

    positions
        .into_iter()
        .filter_map(|position| pair(position, &telemetry))
        .collect()
}

/// Find the representative telemetry spot for one position spot
pub fn pair<'a>(position: &'a Spot, telemetry: &[&'a Spot]) -> Option<Pairing<'a>> {
    let window = Duration::minutes(PAIRING_WINDOW_MIN);
    let mut first: Option<&Spot> = None;
    let mut candidates = 0;

    for &candidate in telemetry {
        let offset = candidate.timestamp - position.timestamp;
        if offset >= window {
            tracing::debug!("Interval {} min past window, stop scanning", offset.num_minutes());
            break;
        }
        if offset >= Duration::zero() {
            first.get_or_insert(candidate);
            candidates += 1;
        }
    }

    first.map(|telemetry| Pairing {
        position,
        telemetry,
        candidates,
    })
}
