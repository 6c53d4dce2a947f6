//! # Live wsprnet Source
//!
//! Queries the wsprnet spot database page and scrapes its result table with
//! an HTML parser.
//!
//! The spots are in the third `<table>` of the page, one `<tr>` per spot,
//! newest first:
//!
//! ```text
//! 2018-05-28 05:50 | OM1AI | 7.040137 | -15 | 0 | JN88 | +23 | 0.200 | DA5UDI | JO30qj | 724 | 450
//! ```

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info};

use super::SpotSource;
use crate::error::{Result, TrackerError};
use crate::spot::normalizer::{RawRow, SourceLayout};

/// Index of the spot table among the page's tables
const SPOT_TABLE_INDEX: usize = 2;

/// Live spot page client
pub struct WsprnetSource {
    client: reqwest::Client,
    url: String,
    band: String,
}

impl std::fmt::Debug for WsprnetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsprnetSource")
            .field("url", &self.url)
            .field("band", &self.band)
            .finish_non_exhaustive()
    }
}

impl WsprnetSource {
    /// Create a source for `url` filtered to `band`
    ///
    /// # Arguments
    ///
    /// * `url` - Spot page URL (e.g. `http://wsprnet.org/olddb`)
    /// * `band` - Band filter passed to the query (e.g. `20`)
    /// * `timeout` - Upper bound for each request
    ///
    /// # Errors
    ///
    /// Returns `SourceFetch` if the HTTP client cannot be built
    pub fn new(url: &str, band: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::SourceFetch(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            band: band.to_string(),
        })
    }

    /// Query URL for `limit` spots
    pub fn query_url(&self, limit: usize) -> String {
        format!(
            "{}?mode=html&band={}&limit={}&findcall=&findreporter=&sort=spotnum",
            self.url, self.band, limit
        )
    }
}

#[async_trait]
impl SpotSource for WsprnetSource {
    fn layout(&self) -> SourceLayout {
        SourceLayout::Live
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawRow>> {
        let url = self.query_url(limit);
        info!("Fetching {} spots from {}", limit, self.url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TrackerError::SourceFetch(e.to_string()))?;

        let page = response
            .text()
            .await
            .map_err(|e| TrackerError::SourceFetch(e.to_string()))?;

        let mut rows = extract_rows(&page)?;
        // Page lists newest first
        rows.reverse();

        debug!("Scraped {} rows", rows.len());
        Ok(rows)
    }
}

/// Cells of every non-empty row of the spot table, empty cells dropped
///
/// Tables are counted in document order, nested tables included.
fn extract_rows(page: &str) -> Result<Vec<RawRow>> {
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let document = Html::parse_document(page);
    let table = document
        .select(&table_selector)
        .nth(SPOT_TABLE_INDEX)
        .ok_or_else(|| TrackerError::SourceFetch("spot table not found in page".to_string()))?;

    let rows = table
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| cell_text(cell.text()))
                .filter(|text| !text.is_empty())
                .collect::<RawRow>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(rows)
}

fn selector(source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|e| TrackerError::SourceFetch(format!("bad selector {:?}: {}", source, e)))
}

/// Concatenated text with non-breaking spaces folded, trimmed
fn cell_text<'a>(fragments: impl Iterator<Item = &'a str>) -> String {
    fragments
        .collect::<String>()
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}
