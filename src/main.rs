//! # WSPR Tracker
//!
//! Track high-altitude balloons through the WSPR spot database.
//!
//! Every poll cycle pulls the latest spots, pairs each balloon position report
//! with its telemetry-channel report, decodes the telemetry and forwards every
//! new sentence to the enabled sinks exactly once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use wspr_tracker::config::Config;
use wspr_tracker::ledger::{MemoryLedger, SentLedger, SqliteLedger};
use wspr_tracker::sink::{HabitatSink, MapSink, TelemetrySink};
use wspr_tracker::source::{ArchiveSource, SpotSource, WsprnetSource};
use wspr_tracker::spot::store::SpotStore;
use wspr_tracker::tracker::Tracker;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "wspr-tracker", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "balloon.toml")]
    config: PathBuf,

    /// Process a wsprnet archive CSV file (plain or gzipped) once and exit
    #[arg(long, value_name = "FILE")]
    archive: Option<PathBuf>,

    /// Decode without uploading; sent sentences are not persisted
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Main entry point for WSPR Tracker
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration
///    - Set up logging to stdout and the log file
///    - Open the sent ledger and build the enabled sinks
///
/// 2. **Main Loop**
///    - Preload the spot cache
///    - Sleep until the next interval boundary, then run one poll cycle
///    - A failed fetch skips the cycle
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Archive Mode**
///    - Process the archive file once and exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded or is invalid
/// - The sent ledger cannot be opened
/// - An HTTP client cannot be built
///
/// # Examples
///
/// ```bash
/// wspr-tracker --config balloon.toml
/// wspr-tracker --archive wsprspots-2020-11.csv --dry-run
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))?;

    // Initialize logging
    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let file_appender = tracing_appender::rolling::never(&config.logging.dir, &config.logging.file);
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    info!("WSPR Tracker v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Tracking these balloons:");
    for balloon in &config.balloons {
        info!(
            "  {} ({}) {} MHz channel {} timeslot {:?}",
            balloon.name, balloon.callsign, balloon.band_mhz, balloon.channel, balloon.timeslot
        );
    }

    let ledger: Arc<dyn SentLedger> = if args.dry_run {
        info!("Dry run. No uploads");
        Arc::new(MemoryLedger::new())
    } else {
        Arc::new(SqliteLedger::open(&config.storage.ledger_path).await?)
    };

    let sinks = if args.dry_run { Vec::new() } else { build_sinks(&config)? };

    // Observed across sleeps and cycles alike
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if let Some(archive) = &args.archive {
        info!("Archive mode: {}", archive.display());
        let source: Box<dyn SpotSource> =
            Box::new(ArchiveSource::new(archive, config.balloons.clone()));
        let mut tracker = Tracker::new(&config, source, ledger, sinks);

        tokio::select! {
            report = tracker.run_batch() => info!("Archive done: {:?}", report?),
            _ = &mut shutdown => info!("Received Ctrl+C, abandoning archive"),
        }
        tracker.shutdown().await;
        return Ok(());
    }

    let source: Box<dyn SpotSource> = Box::new(WsprnetSource::new(
        &config.source.url,
        &config.source.band,
        Duration::from_secs(config.poll.http_timeout_s),
    )?);

    let mut tracker = Tracker::new(&config, source, ledger, sinks);
    if let Some(path) = &config.storage.spot_store {
        tracker = tracker.with_store(SpotStore::new(path));
    }

    tracker.preload(Utc::now()).await;

    info!("Polling every {}s", config.poll.interval_s);
    info!("Press Ctrl+C to exit");

    tracker
        .run_until(async {
            let _ = (&mut shutdown).await;
            info!("Received Ctrl+C, shutting down...");
        })
        .await;

    tracker.shutdown().await;
    Ok(())
}

/// Sinks enabled by the `[main]` switches
fn build_sinks(config: &Config) -> Result<Vec<Box<dyn TelemetrySink>>> {
    let timeout = Duration::from_secs(config.poll.http_timeout_s);
    let mut sinks: Vec<Box<dyn TelemetrySink>> = Vec::new();

    if config.main.push_habhub {
        info!("Pushing to habitat as {}", config.main.habhub_callsign);
        sinks.push(Box::new(HabitatSink::new(
            &config.habitat.url,
            &config.main.habhub_callsign,
            timeout,
        )?));
    }

    if config.main.push_aprs {
        info!("Pushing to map at {}", config.aprs.url);
        sinks.push(Box::new(MapSink::new(&config.aprs.url, timeout)?));
    }

    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["wspr-tracker"]).unwrap();
        assert_eq!(args.config, PathBuf::from("balloon.toml"));
        assert!(args.archive.is_none());
        assert!(!args.dry_run);
        assert!(!args.verbose);
    }

    #[test]
    fn test_archive_dry_run_args() {
        let args = Args::try_parse_from([
            "wspr-tracker",
            "-c",
            "other.toml",
            "--archive",
            "wsprspots-2020-11.csv",
            "--dry-run",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert_eq!(args.archive, Some(PathBuf::from("wsprspots-2020-11.csv")));
        assert!(args.dry_run);
        assert!(args.verbose);
    }

    #[test]
    fn test_sinks_follow_switches() {
        let config: Config = toml::from_str(
            r#"
            [main]
            habhub_callsign = "SA6BSS"
            push_habhub = true
            push_aprs = true

            [aprs]
            url = "http://localhost:8080/position"

            [[balloons]]
            name = "SA6BSS-11"
            callsign = "SA6BSS"
            band_mhz = 14
            channel = 11
            delivery_id = "SA6BSS-11"
            "#,
        )
        .unwrap();

        let sinks = build_sinks(&config).unwrap();
        let names: Vec<_> = sinks.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["habitat", "map"]);
    }
}
