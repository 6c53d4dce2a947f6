//! # Spot Source Module
//!
//! Where raw spot rows come from.
//!
//! This module handles:
//! - Querying the live wsprnet spot page and extracting its table rows
//! - Reading wsprnet archive CSV files
//!
//! Sources only deliver raw rows; the caller normalizes them with the
//! column mapping of [`SpotSource::layout`].

pub mod archive;
pub mod wsprnet;

use async_trait::async_trait;

use crate::error::Result;
use crate::spot::normalizer::{RawRow, SourceLayout};

pub use archive::ArchiveSource;
pub use wsprnet::WsprnetSource;

/// A producer of raw spot rows
#[async_trait]
pub trait SpotSource: Send + Sync {
    /// Row layout of this source
    fn layout(&self) -> SourceLayout;

    /// Fetch up to `limit` rows, oldest first
    ///
    /// # Errors
    ///
    /// Returns `SourceFetch` on network or parse failure. The poll loop skips
    /// the cycle and retries on the next one.
    async fn fetch(&self, limit: usize) -> Result<Vec<RawRow>>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::TrackerError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Mock source replaying scripted fetch results
    #[derive(Clone)]
    pub struct MockSpotSource {
        pub layout: SourceLayout,
        pub responses: Arc<Mutex<VecDeque<Option<Vec<RawRow>>>>>,
        pub requested: Arc<Mutex<Vec<usize>>>,
    }

    impl MockSpotSource {
        pub fn new(layout: SourceLayout) -> Self {
            Self {
                layout,
                responses: Arc::new(Mutex::new(VecDeque::new())),
                requested: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Queue a successful fetch
        pub fn push_rows(&self, rows: Vec<RawRow>) {
            self.responses.lock().unwrap().push_back(Some(rows));
        }

        /// Queue a failed fetch
        pub fn push_failure(&self) {
            self.responses.lock().unwrap().push_back(None);
        }

        pub fn requested_limits(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpotSource for MockSpotSource {
        fn layout(&self) -> SourceLayout {
            self.layout
        }

        async fn fetch(&self, limit: usize) -> Result<Vec<RawRow>> {
            self.requested.lock().unwrap().push(limit);
            match self.responses.lock().unwrap().pop_front() {
                Some(Some(rows)) => Ok(rows),
                Some(None) => Err(TrackerError::SourceFetch("Mock fetch error".to_string())),
                None => Ok(Vec::new()),
            }
        }
    }
}
