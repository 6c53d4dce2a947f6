//! # Spot Store
//!
//! Optional JSON-lines file of spots, read at startup to pre-seed the cache and
//! appended with every cycle's new arrivals.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::Spot;
use crate::error::Result;

/// JSON-lines spot store
#[derive(Debug, Clone)]
pub struct SpotStore {
    path: PathBuf,
}

impl SpotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored spot
    ///
    /// A missing file yields an empty list. Lines that do not parse are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read
    pub fn load(&self) -> Result<Vec<Spot>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No spot store at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut spots = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Spot>(&line) {
                Ok(spot) => spots.push(spot),
                Err(e) => warn!("Skipping spot store line {}: {}", number + 1, e),
            }
        }

        info!("Loaded {} spots from {}", spots.len(), self.path.display());
        Ok(spots)
    }

    /// Append spots to the store
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or written
    pub fn append(&self, spots: &[Spot]) -> Result<()> {
        if spots.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut buffer = String::new();
        for spot in spots {
            buffer.push_str(&serde_json::to_string(spot)?);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
