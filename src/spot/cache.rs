//! # Spot Cache
//!
//! Rolling window of recent spots, kept ascending by `(timestamp, tx_call)`.
//!
//! Two caches run side by side in the tracker: one detects genuinely new
//! arrivals across poll cycles, the other holds the deduplicated window that
//! correlation reads. Both are mutated only between correlation passes.

use chrono::{DateTime, Duration, Utc};

use super::{is_time_sorted, sort_spots, Spot};

/// Default capacity of the arrival cache
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Ascending, capacity-bounded spot window
#[derive(Debug, Clone, Default)]
pub struct SpotCache {
    spots: Vec<Spot>,
}

impl SpotCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self { spots: Vec::new() }
    }

    /// Create a cache from arbitrary spots (sorted on entry)
    pub fn from_spots(mut spots: Vec<Spot>) -> Self {
        sort_spots(&mut spots);
        Self { spots }
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Current contents, ascending
    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    /// Insert candidates not already present and return them
    ///
    /// A candidate is new if no cached spot is equal to it in every field.
    /// Equal candidates collapse to one. Ascending order is preserved.
    ///
    /// # Returns
    ///
    /// * `Vec<Spot>` - The newly inserted spots, ascending
    pub fn merge(&mut self, mut candidates: Vec<Spot>) -> Vec<Spot> {
        sort_spots(&mut candidates);

        let mut fresh: Vec<Spot> = Vec::new();
        for candidate in candidates {
            let seen = fresh
                .iter()
                .rev()
                .take_while(|s| s.sort_key() == candidate.sort_key())
                .any(|s| *s == candidate);
            if seen || self.contains(&candidate) {
                continue;
            }
            fresh.push(candidate);
        }

        for spot in &fresh {
            let at = self
                .spots
                .partition_point(|s| s.sort_key() <= spot.sort_key());
            self.spots.insert(at, spot.clone());
        }

        fresh
    }

    /// Structural membership test
    pub fn contains(&self, spot: &Spot) -> bool {
        let key = spot.sort_key();
        let start = self.spots.partition_point(|s| s.sort_key() < key);
        self.spots[start..]
            .iter()
            .take_while(|s| s.sort_key() == key)
            .any(|s| s == spot)
    }

    /// Drop every spot older than `now - window`
    ///
    /// The cut is made at a single boundary index. A cache holding exactly one
    /// spot keeps it regardless of age.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of spots removed
    pub fn age_trim(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        debug_assert!(is_time_sorted(&self.spots), "age_trim requires ascending spots");

        if self.spots.len() <= 1 {
            return 0;
        }

        let cutoff = now - window;
        let boundary = self.spots.partition_point(|s| s.timestamp < cutoff);
        self.spots.drain(..boundary);

        tracing::debug!("age_trim removed {} spots, {} left", boundary, self.spots.len());
        boundary
    }

    /// Collapse consecutive spots sharing timestamp and transmitting callsign
    pub fn dedupe(&mut self) -> usize {
        let before = self.spots.len();
        self.spots = dedupe(std::mem::take(&mut self.spots));
        before - self.spots.len()
    }

    /// Keep only the most recent `n` spots
    pub fn cap_bound(&mut self, n: usize) -> usize {
        if self.spots.len() <= n {
            return 0;
        }
        let overflow = self.spots.len() - n;
        self.spots.drain(..overflow);
        overflow
    }
}

/// Collapse consecutive entries with identical `(timestamp, tx_call)`
///
/// The first entry of each run is kept. The reporter-specific fields of the
/// collapsed entries are lost. Input must be ascending by `(timestamp, tx_call)`.
pub fn dedupe(mut spots: Vec<Spot>) -> Vec<Spot> {
    spots.dedup_by(|next, kept| next.timestamp == kept.timestamp && next.tx_call == kept.tx_call);
    spots
}
