//! # Tracker Module
//!
//! The poll cycle: fetch, normalize, filter, cache, correlate, decode and
//! deliver.
//!
//! ## Cycle
//!
//! ```text
//! fetch ─► normalize ─► balloon filter ─► sort
//!   ─► arrival cache (age trim, merge) ─► spot store
//!   ─► processing window (merge, dedupe, age trim)
//!   ─► per payload: correlate ─► decode ─► ledger ─► sinks
//! ```
//!
//! All loop state lives in [`PollState`]. Caches are only mutated between
//! correlation passes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{BalloonConfig, Config, PollConfig};
use crate::error::Result;
use crate::ledger::{SentLedger, SentRecord};
use crate::sink::{Delivery, TelemetrySink};
use crate::source::SpotSource;
use crate::spot::cache::SpotCache;
use crate::spot::filter::balloon_filter;
use crate::spot::normalizer::normalize_all;
use crate::spot::store::SpotStore;
use crate::spot::{sort_spots, Spot};
use crate::telemetry::correlator::correlate;
use crate::telemetry::decoder::decode;
use crate::telemetry::sentence::build_sentence;

/// Amount added to the fetch size when a fetch was entirely new spots
pub const FETCH_GROWTH: usize = 100;

/// Mutable state carried across poll cycles
#[derive(Debug, Clone)]
pub struct PollState {
    /// Every balloon spot seen recently; detects new arrivals
    pub seen: SpotCache,
    /// Deduplicated spots read by correlation
    pub window: SpotCache,
    /// Number of spots requested per fetch
    pub fetch_count: usize,
    /// Largest number of new arrivals in one cycle
    pub new_max: usize,
    /// Completed cycles
    pub cycles: u64,
}

impl PollState {
    /// Empty caches, zero counters
    pub fn new(fetch_count: usize) -> Self {
        Self {
            seen: SpotCache::new(),
            window: SpotCache::new(),
            fetch_count,
            new_max: 0,
            cycles: 0,
        }
    }
}

/// Outcome of one correlation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Pairings decoded into a sentence
    pub decoded: usize,
    /// Sentences newly recorded in the ledger
    pub recorded: usize,
    /// Sentences the ledger already held
    pub already_sent: usize,
    /// Pairings that could not be decoded
    pub decode_failures: usize,
    /// Sentences skipped because the ledger failed
    pub ledger_failures: usize,
    /// Successful sink deliveries
    pub delivered: usize,
    /// Failed sink deliveries
    pub delivery_failures: usize,
}

/// Statistics of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub malformed: usize,
    pub arrivals: usize,
    pub window: usize,
    pub report: ProcessReport,
}

/// Poll loop driver
pub struct Tracker {
    poll: PollConfig,
    balloons: Vec<BalloonConfig>,
    source: Box<dyn SpotSource>,
    ledger: Arc<dyn SentLedger>,
    sinks: Vec<Box<dyn TelemetrySink>>,
    store: Option<SpotStore>,
    state: PollState,
}

impl Tracker {
    pub fn new(
        config: &Config,
        source: Box<dyn SpotSource>,
        ledger: Arc<dyn SentLedger>,
        sinks: Vec<Box<dyn TelemetrySink>>,
    ) -> Self {
        Self {
            poll: config.poll.clone(),
            balloons: config.balloons.clone(),
            source,
            ledger,
            sinks,
            store: None,
            state: PollState::new(config.poll.fetch_count),
        }
    }

    /// Persist new arrivals to `store` and seed from it on preload
    pub fn with_store(mut self, store: SpotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Seed the caches before the first cycle
    ///
    /// Reads the spot store (if any), then fetches `preload_count` spots.
    /// Nothing is correlated here; the first cycle processes the seeded
    /// window. A failed fetch is logged and the tracker starts with
    /// whatever the store held.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of spots seeded
    pub async fn preload(&mut self, now: DateTime<Utc>) -> usize {
        let mut spots = Vec::new();

        if let Some(store) = &self.store {
            match store.load() {
                Ok(stored) => spots.extend(stored),
                Err(e) => warn!("Cannot read spot store {}: {}", store.path().display(), e),
            }
        }

        info!("Preloading spot cache with {} spots...", self.poll.preload_count);
        match self.source.fetch(self.poll.preload_count).await {
            Ok(rows) => {
                let (fetched, malformed) = normalize_all(&rows, self.source.layout());
                if malformed > 0 {
                    debug!("Preload dropped {} malformed rows", malformed);
                }
                spots.extend(fetched);
            }
            Err(e) => warn!("Preload fetch failed: {}", e),
        }

        let mut spots = within_window(balloon_filter(spots, &self.balloons), now, &self.poll);
        sort_spots(&mut spots);

        let seeded = self.state.seen.merge(spots);
        self.state.window.merge(seeded.clone());
        self.state.window.dedupe();
        self.state.seen.age_trim(now, cache_window(&self.poll));
        self.state.window.age_trim(now, process_window(&self.poll));

        info!("Got {} balloon spots in cache", self.state.seen.len());
        seeded.len()
    }

    /// Run one poll cycle at wall clock `now`
    ///
    /// # Errors
    ///
    /// Returns `SourceFetch` if the fetch failed; the state is unchanged and
    /// the next cycle retries.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleStats> {
        info!("Begin polling cycle {}", self.state.cycles + 1);

        let rows = self.source.fetch(self.state.fetch_count).await?;
        let (spots, malformed) = normalize_all(&rows, self.source.layout());
        // Spots older than the cache window would be trimmed and re-seen next cycle
        let mut spots = within_window(balloon_filter(spots, &self.balloons), now, &self.poll);
        sort_spots(&mut spots);

        let state = &mut self.state;
        state.seen.age_trim(now, cache_window(&self.poll));
        let arrivals = state.seen.merge(spots);
        for spot in &arrivals {
            debug!("New spot: {} {} {}", spot.timestamp, spot.tx_call, spot.rx_call);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&arrivals) {
                warn!("Cannot append to spot store {}: {}", store.path().display(), e);
            }
        }

        info!(
            "Add {} new balloon spots to {} previous spots",
            arrivals.len(),
            state.window.len()
        );
        state.window.merge(arrivals.clone());
        state.window.dedupe();
        state.window.age_trim(now, process_window(&self.poll));

        let report = if state.window.len() > 1 {
            info!("Processing {} spots", state.window.len());
            process_payloads(
                state.window.spots(),
                &self.balloons,
                self.ledger.as_ref(),
                &self.sinks,
            )
            .await
        } else {
            ProcessReport::default()
        };

        state.new_max = state.new_max.max(arrivals.len());
        if arrivals.len() == state.fetch_count {
            info!("Hit max spots, increasing fetch size");
            state.fetch_count += FETCH_GROWTH;
        }

        let capped = state.seen.cap_bound(self.poll.cache_max);
        if capped > 0 {
            debug!("Cache capped, dropped {} oldest spots", capped);
        }

        state.cycles += 1;

        let stats = CycleStats {
            fetched: rows.len(),
            malformed,
            arrivals: arrivals.len(),
            window: state.window.len(),
            report,
        };

        info!(
            "Cycle {}: fetched {}, malformed {}, new {}, window {}, cache {}, fetch size {}, max new {}",
            state.cycles,
            stats.fetched,
            stats.malformed,
            stats.arrivals,
            stats.window,
            state.seen.len(),
            state.fetch_count,
            state.new_max
        );
        info!(
            "Cycle {}: decoded {}, recorded {}, already sent {}, decode failures {}, \
             ledger failures {}, delivered {}, delivery failures {}",
            state.cycles,
            report.decoded,
            report.recorded,
            report.already_sent,
            report.decode_failures,
            report.ledger_failures,
            report.delivered,
            report.delivery_failures
        );

        Ok(stats)
    }

    /// Run aligned poll cycles until `shutdown` resolves
    ///
    /// `shutdown` races both the sleep to the next interval boundary and the
    /// cycle itself; a cycle in flight is abandoned. A failed cycle is logged
    /// and the loop continues.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) {
        tokio::pin!(shutdown);

        loop {
            let wait = until_next_boundary(Utc::now().timestamp(), self.poll.interval_s);
            debug!("Next cycle in {}s", wait.as_secs());

            let cycle = async {
                tokio::time::sleep(wait).await;
                if let Err(e) = self.run_cycle(Utc::now()).await {
                    warn!("Cycle skipped: {}", e);
                }
            };

            tokio::select! {
                _ = cycle => {}
                _ = &mut shutdown => break,
            }
        }
    }

    /// Process one complete batch (archive files)
    ///
    /// No age trimming is applied; every balloon spot of the batch is
    /// correlated once.
    ///
    /// # Errors
    ///
    /// Returns `SourceFetch` if the batch cannot be read
    pub async fn run_batch(&mut self) -> Result<ProcessReport> {
        let rows = self.source.fetch(self.state.fetch_count).await?;
        let (spots, malformed) = normalize_all(&rows, self.source.layout());
        info!("Read {} spots, dropped {} malformed rows", spots.len(), malformed);

        let mut window = SpotCache::from_spots(balloon_filter(spots, &self.balloons));
        window.dedupe();

        if window.len() <= 1 {
            info!("No spots!");
            return Ok(ProcessReport::default());
        }

        info!("Spots: {}", window.len());
        let report =
            process_payloads(window.spots(), &self.balloons, self.ledger.as_ref(), &self.sinks)
                .await;
        self.state.window = window;
        self.state.cycles += 1;

        Ok(report)
    }

    /// Log final statistics
    pub async fn shutdown(&self) {
        let recorded = match self.ledger.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Cannot count ledger: {}", e);
                0
            }
        };
        info!(
            "Shutting down after {} cycles: cache {}, window {}, max new spots {}, {} sentences in ledger",
            self.state.cycles,
            self.state.seen.len(),
            self.state.window.len(),
            self.state.new_max,
            recorded
        );
    }
}

/// Correlate, decode and deliver every tracked payload
///
/// A sentence is delivered only when this call inserted it into the ledger.
/// Sink failures are counted but the sentence stays recorded. A ledger
/// failure skips delivery of that sentence.
///
/// `spots` must be ascending.
pub async fn process_payloads(
    spots: &[Spot],
    balloons: &[BalloonConfig],
    ledger: &dyn SentLedger,
    sinks: &[Box<dyn TelemetrySink>],
) -> ProcessReport {
    let mut report = ProcessReport::default();

    for balloon in balloons {
        for pairing in correlate(spots, balloon) {
            debug!(
                "{}: pairing {} with {} ({} candidates)",
                balloon.name,
                pairing.position.timestamp,
                pairing.telemetry.tx_call,
                pairing.candidates
            );

            let decoded = match decode(pairing.position, pairing.telemetry) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(
                        "{}: cannot decode pairing at {}: {}",
                        balloon.name, pairing.position.timestamp, e
                    );
                    report.decode_failures += 1;
                    continue;
                }
            };
            report.decoded += 1;

            let sentence = build_sentence(&balloon.name, &decoded);
            let record = SentRecord::now(&balloon.name, decoded.time, &sentence);

            match ledger.insert_if_absent(record).await {
                Ok(true) => {
                    info!("{}: new telemetry {}", balloon.name, sentence);
                    report.recorded += 1;
                }
                Ok(false) => {
                    debug!("{}: already sent {}", balloon.name, sentence);
                    report.already_sent += 1;
                    continue;
                }
                Err(e) => {
                    error!("{}: not delivering {}: {}", balloon.name, sentence, e);
                    report.ledger_failures += 1;
                    continue;
                }
            }

            let delivery = Delivery {
                payload_name: balloon.name.clone(),
                delivery_id: balloon.delivery_id.clone(),
                sentence,
                received_at: decoded.time,
                lat: decoded.lat,
                lon: decoded.lon,
                alt: decoded.altitude_m,
            };

            for sink in sinks {
                match sink.deliver(&delivery).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!("{}: {} delivery failed: {}", balloon.name, sink.name(), e);
                        report.delivery_failures += 1;
                    }
                }
            }
        }
    }

    report
}

/// Time until the next multiple of `interval_s` seconds since the epoch
pub fn until_next_boundary(epoch_secs: i64, interval_s: u64) -> Duration {
    let interval = interval_s.max(1) as i64;
    Duration::from_secs((interval - epoch_secs.rem_euclid(interval)) as u64)
}

/// Spots no older than the cache window at `now`
fn within_window(spots: Vec<Spot>, now: DateTime<Utc>, poll: &PollConfig) -> Vec<Spot> {
    let cutoff = now - cache_window(poll);
    spots.into_iter().filter(|s| s.timestamp >= cutoff).collect()
}

fn cache_window(poll: &PollConfig) -> chrono::Duration {
    chrono::Duration::minutes(poll.cache_window_min)
}

fn process_window(poll: &PollConfig) -> chrono::Duration {
    chrono::Duration::minutes(poll.process_window_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::ledger::MemoryLedger;
    use crate::sink::MockTelemetrySink;
    use crate::source::mocks::MockSpotSource;
    use crate::spot::normalizer::{RawRow, SourceLayout};
    use chrono::TimeZone;
    use tempfile::TempDir;

    const POSITION_SENTENCE: &str =
        "$$SA6BSS-11,1527831840,05:44,55.75000,62.00000,8900,60,-25.40,3.10,0,1*6f";

    fn test_config(fetch_count: usize) -> Config {
        let toml = format!(
            r#"
            [main]
            habhub_callsign = "SA6BSS"

            [poll]
            fetch_count = {}

            [[balloons]]
            name = "SA6BSS-11"
            callsign = "SA6BSS"
            band_mhz = 14
            channel = 11
            delivery_id = "SA6BSS-11"
            "#,
            fetch_count
        );
        toml::from_str(&toml).unwrap()
    }

    fn live_row(time: &str, call: &str, locator: &str, power: &str, reporter: &str) -> RawRow {
        [
            time, call, "14.097174", "-19", "0", locator, power, "0.020", reporter, "JP99gb",
            "2659", "1652",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn balloon_rows() -> Vec<RawRow> {
        vec![
            live_row("2018-06-01 05:44", "SA6BSS", "MO15", "+13", "LA9JO"),
            live_row("2018-06-01 05:46", "Q11DCN", "FB18", "+50", "LA9JO"),
        ]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 1, 5, 50, 0).unwrap()
    }

    fn sink_expecting(deliveries: usize) -> Box<dyn TelemetrySink> {
        let mut sink = MockTelemetrySink::new();
        sink.expect_name().return_const("mock");
        sink.expect_deliver().times(deliveries).returning(|_| Ok(()));
        Box::new(sink)
    }

    fn tracker(
        source: &MockSpotSource,
        ledger: Arc<dyn SentLedger>,
        sinks: Vec<Box<dyn TelemetrySink>>,
        fetch_count: usize,
    ) -> Tracker {
        Tracker::new(&test_config(fetch_count), Box::new(source.clone()), ledger, sinks)
    }

    struct BrokenLedger;

    #[async_trait::async_trait]
    impl SentLedger for BrokenLedger {
        async fn is_already_sent(&self, _sentence: &str) -> Result<bool> {
            Err(TrackerError::Ledger("disk gone".to_string()))
        }

        async fn insert_if_absent(&self, _record: SentRecord) -> Result<bool> {
            Err(TrackerError::Ledger("disk gone".to_string()))
        }

        async fn count(&self) -> Result<usize> {
            Err(TrackerError::Ledger("disk gone".to_string()))
        }
    }

    #[test]
    fn test_poll_state_starts_empty() {
        let state = PollState::new(8000);
        assert!(state.seen.is_empty());
        assert!(state.window.is_empty());
        assert_eq!(state.fetch_count, 8000);
        assert_eq!(state.new_max, 0);
        assert_eq!(state.cycles, 0);
    }

    #[tokio::test]
    async fn test_repeated_cycles_deliver_once() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());
        source.push_rows(balloon_rows());
        source.push_rows(Vec::new());

        let ledger = Arc::new(MemoryLedger::new());
        let mut tracker = tracker(&source, ledger.clone(), vec![sink_expecting(1)], 8000);

        let first = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.arrivals, 2);
        assert_eq!(first.window, 2);
        assert_eq!(first.report.decoded, 1);
        assert_eq!(first.report.recorded, 1);
        assert_eq!(first.report.delivered, 1);

        let second = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(second.arrivals, 0);
        assert_eq!(second.report.decoded, 1);
        assert_eq!(second.report.recorded, 0);
        assert_eq!(second.report.already_sent, 1);

        let third = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(third.report.already_sent, 1);

        assert_eq!(ledger.count().await.unwrap(), 1);
        assert!(ledger.is_already_sent(POSITION_SENTENCE).await.unwrap());
        assert_eq!(tracker.state().cycles, 3);
    }

    #[tokio::test]
    async fn test_delivery_carries_decoded_position() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());

        let mut sink = MockTelemetrySink::new();
        sink.expect_name().return_const("mock");
        sink.expect_deliver()
            .withf(|d: &Delivery| {
                d.payload_name == "SA6BSS-11"
                    && d.delivery_id == "SA6BSS-11"
                    && d.sentence == POSITION_SENTENCE
                    && d.lat == 55.75
                    && d.lon == 62.0
                    && d.alt == 8900
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![Box::new(sink)], 8000);
        tracker.run_cycle(now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_cycle() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_failure();
        source.push_rows(balloon_rows());

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 8000);

        let result = tracker.run_cycle(now()).await;
        assert!(matches!(result, Err(TrackerError::SourceFetch(_))));
        assert_eq!(tracker.state().cycles, 0);
        assert!(tracker.state().seen.is_empty());

        let stats = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(stats.report.delivered, 1);
    }

    #[tokio::test]
    async fn test_unknown_power_level_not_delivered() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(vec![
            live_row("2018-06-01 05:44", "SA6BSS", "MO15", "+13", "LA9JO"),
            live_row("2018-06-01 05:46", "Q11DCN", "FB18", "+5", "LA9JO"),
        ]);

        let ledger = Arc::new(MemoryLedger::new());
        let mut tracker = tracker(&source, ledger.clone(), vec![sink_expecting(0)], 8000);

        let stats = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(stats.report.decode_failures, 1);
        assert_eq!(stats.report.decoded, 0);
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_still_recorded() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());
        source.push_rows(balloon_rows());

        let mut failing = MockTelemetrySink::new();
        failing.expect_name().return_const("failing");
        failing.expect_deliver().times(1).returning(|_| {
            Err(TrackerError::SinkDelivery {
                sink: "failing",
                reason: "503".to_string(),
            })
        });

        let ledger = Arc::new(MemoryLedger::new());
        let mut tracker = tracker(
            &source,
            ledger.clone(),
            vec![Box::new(failing), sink_expecting(1)],
            8000,
        );

        let first = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(first.report.delivery_failures, 1);
        assert_eq!(first.report.delivered, 1);
        assert!(ledger.is_already_sent(POSITION_SENTENCE).await.unwrap());

        let second = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(second.report.already_sent, 1);
        assert_eq!(second.report.delivery_failures, 0);
    }

    #[tokio::test]
    async fn test_ledger_failure_skips_delivery() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());

        let mut tracker = tracker(&source, Arc::new(BrokenLedger), vec![sink_expecting(0)], 8000);

        let stats = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(stats.report.decoded, 1);
        assert_eq!(stats.report.ledger_failures, 1);
        assert_eq!(stats.report.delivered, 0);

        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_reports_collapse_in_window() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(vec![
            live_row("2018-06-01 05:44", "SA6BSS", "MO15", "+13", "LA9JO"),
            live_row("2018-06-01 05:44", "SA6BSS", "MO15", "+13", "DA5UDI"),
            live_row("2018-06-01 05:46", "Q11DCN", "FB18", "+50", "LA9JO"),
            live_row("2018-06-01 05:46", "Q11DCN", "FB18", "+50", "DA5UDI"),
        ]);

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 8000);

        let stats = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(stats.arrivals, 4);
        assert_eq!(stats.window, 2);
        assert_eq!(stats.report.decoded, 1);
    }

    #[tokio::test]
    async fn test_fetch_size_grows_when_all_new() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());
        source.push_rows(Vec::new());

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 2);

        tracker.run_cycle(now()).await.unwrap();
        assert_eq!(tracker.state().fetch_count, 2 + FETCH_GROWTH);
        assert_eq!(tracker.state().new_max, 2);

        tracker.run_cycle(now()).await.unwrap();
        assert_eq!(source.requested_limits(), vec![2, 2 + FETCH_GROWTH]);
    }

    #[tokio::test]
    async fn test_old_spots_leave_window() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(0)], 8000);

        let later = Utc.with_ymd_and_hms(2018, 6, 1, 8, 0, 0).unwrap();
        let stats = tracker.run_cycle(later).await.unwrap();
        assert_eq!(stats.arrivals, 0);
        assert_eq!(stats.window, 0);
        assert!(tracker.state().seen.is_empty());
        assert_eq!(stats.report, ProcessReport::default());
    }

    #[tokio::test]
    async fn test_stale_spots_not_stored_again() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("spots.jsonl");

        let source = MockSpotSource::new(SourceLayout::Live);
        for _ in 0..3 {
            source.push_rows(balloon_rows());
        }
        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 8000)
            .with_store(SpotStore::new(&store_path));

        let first = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(first.arrivals, 2);
        let stored = SpotStore::new(&store_path).load().unwrap().len();
        assert_eq!(stored, 2);

        // Both spots are now past the cache window
        let later = Utc.with_ymd_and_hms(2018, 6, 1, 8, 0, 0).unwrap();
        for _ in 0..2 {
            let stats = tracker.run_cycle(later).await.unwrap();
            assert_eq!(stats.arrivals, 0);
        }

        assert_eq!(SpotStore::new(&store_path).load().unwrap().len(), stored);
    }

    #[tokio::test]
    async fn test_preload_seeds_without_processing() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());
        source.push_rows(balloon_rows());

        let ledger = Arc::new(MemoryLedger::new());
        let mut tracker = tracker(&source, ledger.clone(), vec![sink_expecting(1)], 8000);

        let seeded = tracker.preload(now()).await;
        assert_eq!(seeded, 2);
        assert_eq!(ledger.count().await.unwrap(), 0);
        assert_eq!(tracker.state().window.len(), 2);

        let stats = tracker.run_cycle(now()).await.unwrap();
        assert_eq!(stats.arrivals, 0);
        assert_eq!(stats.report.delivered, 1);
        assert_eq!(source.requested_limits(), vec![10_000, 8000]);
    }

    #[tokio::test]
    async fn test_spot_store_round_trip_across_restart() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("spots.jsonl");

        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());
        let mut first = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 8000)
            .with_store(SpotStore::new(&store_path));
        first.run_cycle(now()).await.unwrap();

        let restarted_source = MockSpotSource::new(SourceLayout::Live);
        restarted_source.push_failure();
        let mut second = tracker(
            &restarted_source,
            Arc::new(MemoryLedger::new()),
            vec![sink_expecting(0)],
            8000,
        )
        .with_store(SpotStore::new(&store_path));

        assert_eq!(second.preload(now()).await, 2);
        assert_eq!(second.state().seen.len(), 2);
    }

    #[tokio::test]
    async fn test_run_batch_processes_once() {
        let source = MockSpotSource::new(SourceLayout::Live);
        source.push_rows(balloon_rows());

        let mut tracker = tracker(&source, Arc::new(MemoryLedger::new()), vec![sink_expecting(1)], 8000);

        let report = tracker.run_batch().await.unwrap();
        assert_eq!(report.decoded, 1);
        assert_eq!(report.delivered, 1);
    }

    /// Source whose fetch never completes
    struct StalledSource {
        entered: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl SpotSource for StalledSource {
        fn layout(&self) -> SourceLayout {
            SourceLayout::Live
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<RawRow>> {
            self.entered.store(true, std::sync::atomic::Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_cycle_in_flight() {
        let entered = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut config = test_config(8000);
        config.poll.interval_s = 1;

        let source = StalledSource {
            entered: Arc::clone(&entered),
        };
        let mut tracker = Tracker::new(&config, Box::new(source), Arc::new(MemoryLedger::new()), Vec::new());

        // The first boundary is at most 1s away; the fetch then hangs
        let stopped = tokio::time::timeout(
            Duration::from_secs(10),
            tracker.run_until(tokio::time::sleep(Duration::from_millis(1500))),
        )
        .await;

        assert!(stopped.is_ok());
        assert!(entered.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(tracker.state().cycles, 0);
    }

    #[test]
    fn test_until_next_boundary() {
        assert_eq!(until_next_boundary(180, 90), Duration::from_secs(90));
        assert_eq!(until_next_boundary(181, 90), Duration::from_secs(89));
        assert_eq!(until_next_boundary(269, 90), Duration::from_secs(1));
        assert_eq!(until_next_boundary(1_527_831_840, 60), Duration::from_secs(60));
    }
}
