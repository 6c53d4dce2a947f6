//! # Maidenhead Locator Decoding
//!
//! Converts 2 to 8 character grid locators to the latitude/longitude of the
//! square's south-west corner.
//!
//! | Pair | Characters | Longitude step | Latitude step |
//! |------|------------|----------------|---------------|
//! | Field | `A`-`R` | 20° | 10° |
//! | Square | `0`-`9` | 2° | 1° |
//! | Subsquare | `a`-`x` | 5' | 2.5' |
//! | Extended | `0`-`9` | 0.5' | 0.25' |
//!
//! Subsquare letters up to `z` are accepted: decoded telemetry can produce
//! them and they are passed through rather than rejected.

use crate::error::{Result, TrackerError};

/// Decode a locator into `(latitude, longitude)` degrees
///
/// # Errors
///
/// Returns `MalformedTelemetry` if the locator has an odd length, is shorter
/// than 2 or longer than 8 characters, or holds a character out of range for
/// its position.
///
/// # Examples
///
/// ```
/// use wspr_tracker::telemetry::maidenhead::to_lat_lon;
///
/// let (lat, lon) = to_lat_lon("MO15as")?;
/// assert!((lat - 55.75).abs() < 1e-9);
/// assert!((lon - 62.0).abs() < 1e-9);
/// # Ok::<(), wspr_tracker::error::TrackerError>(())
/// ```
pub fn to_lat_lon(locator: &str) -> Result<(f64, f64)> {
    let upper = locator.trim().to_ascii_uppercase();
    let chars = upper.as_bytes();

    if chars.len() < 2 || chars.len() > 8 || chars.len() % 2 != 0 {
        return Err(bad_locator(locator));
    }

    let mut lon = -180.0;
    let mut lat = -90.0;

    lon += f64::from(letter(chars[0], b'R', locator)?) * 20.0;
    lat += f64::from(letter(chars[1], b'R', locator)?) * 10.0;

    if chars.len() >= 4 {
        lon += f64::from(digit(chars[2], locator)?) * 2.0;
        lat += f64::from(digit(chars[3], locator)?);
    }

    if chars.len() >= 6 {
        lon += f64::from(letter(chars[4], b'Z', locator)?) * 5.0 / 60.0;
        lat += f64::from(letter(chars[5], b'Z', locator)?) * 2.5 / 60.0;
    }

    if chars.len() == 8 {
        lon += f64::from(digit(chars[6], locator)?) * 5.0 / 600.0;
        lat += f64::from(digit(chars[7], locator)?) * 2.5 / 600.0;
    }

    Ok((lat, lon))
}

fn letter(c: u8, last: u8, locator: &str) -> Result<u8> {
    if (b'A'..=last).contains(&c) {
        Ok(c - b'A')
    } else {
        Err(bad_locator(locator))
    }
}

fn digit(c: u8, locator: &str) -> Result<u8> {
    if c.is_ascii_digit() {
        Ok(c - b'0')
    } else {
        Err(bad_locator(locator))
    }
}

fn bad_locator(locator: &str) -> TrackerError {
    TrackerError::MalformedTelemetry(format!("invalid Maidenhead locator {:?}", locator))
}
