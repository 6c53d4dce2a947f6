//! wsprnet archive CSV source
//!
//! Monthly archive files have no header row:
//!
//! ```text
//! spot_id,epoch,reporter,reporter_grid,snr,freq,call,grid,power,drift,distance,azimuth,band,version,code
//! ```
//!
//! Files are read plain or gzipped (detected from the gzip magic bytes) and
//! streamed record by record. Only rows sent by a tracked balloon or a
//! telemetry-channel callsign are kept, so a month of spots never has to fit
//! in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tracing::{info, warn};

use super::SpotSource;
use crate::config::BalloonConfig;
use crate::error::{Result, TrackerError};
use crate::spot::filter::is_balloon_call;
use crate::spot::normalizer::{RawRow, SourceLayout};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Archive file reader
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
    balloons: Vec<BalloonConfig>,
}

impl ArchiveSource {
    /// Reader for the archive at `path`, keeping rows relevant to `balloons`
    pub fn new<P: AsRef<Path>>(path: P, balloons: Vec<BalloonConfig>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            balloons,
        }
    }

    /// Read the balloon rows of the archive
    ///
    /// Unreadable records are skipped with a warning; the normalizer drops
    /// rows whose fields fail coercion.
    ///
    /// # Errors
    ///
    /// Returns `SourceFetch` if the file cannot be opened
    pub fn read_rows(&self) -> Result<Vec<RawRow>> {
        let input = self.open()?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let tx_call = SourceLayout::Archive.column_map().tx_call;
        let mut rows = Vec::new();
        let mut total = 0usize;

        for (number, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping archive record {}: {}", number + 1, e);
                    continue;
                }
            };
            total += 1;

            let relevant = record
                .get(tx_call)
                .is_some_and(|call| is_balloon_call(call, &self.balloons));
            if relevant {
                rows.push(record.iter().map(str::to_string).collect());
            }
        }

        info!(
            "Kept {} balloon rows of {} from {}",
            rows.len(),
            total,
            self.path.display()
        );
        Ok(rows)
    }

    /// Buffered reader over the file, decompressing gzip input
    fn open(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path).map_err(|e| self.open_error(e))?;
        let mut buffered = BufReader::new(file);

        let is_gzip = buffered
            .fill_buf()
            .map_err(|e| self.open_error(e))?
            .starts_with(&GZIP_MAGIC);

        if is_gzip {
            Ok(Box::new(GzDecoder::new(buffered)))
        } else {
            Ok(Box::new(buffered))
        }
    }

    fn open_error(&self, e: std::io::Error) -> TrackerError {
        TrackerError::SourceFetch(format!("cannot open {}: {}", self.path.display(), e))
    }
}

#[async_trait]
impl SpotSource for ArchiveSource {
    fn layout(&self) -> SourceLayout {
        SourceLayout::Archive
    }

    /// The whole file is read; `limit` does not apply to archives
    async fn fetch(&self, _limit: usize) -> Result<Vec<RawRow>> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read_rows())
            .await
            .map_err(|e| TrackerError::SourceFetch(format!("archive reader failed: {}", e)))?
    }
}
