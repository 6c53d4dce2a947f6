//! # Telemetry Decoder
//!
//! Decodes the telemetry a balloon packs into the callsign, locator and power
//! of its telemetry-channel transmission.
//!
//! ## Packing
//!
//! The telemetry callsign carries one alphanumeric and three letter digits at
//! positions 1, 3, 4 and 5. Read as a base-26 number they give `N1`, which
//! holds the two subsquare letters and the altitude:
//!
//! ```text
//! N1 = sub1 * 25632 + sub2 * 1068 + altitude / 20
//! ```
//!
//! The telemetry locator and power give `N2` (radices 18, 10, 10, 19):
//!
//! ```text
//! N2 = temperature * 6720 + battery * 168 + speed * 4 + gps * 2 + sats
//! ```
//!
//! The constants are reverse engineered from balloon firmware and must be kept
//! bit for bit. All arithmetic is integer until the final unit scaling.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::maidenhead;
use crate::error::{Result, TrackerError};
use crate::spot::Spot;

/// The 19 standard WSPR power levels in dBm, indexed by power code
pub const POWER_LEVELS_DBM: [i32; 19] = [
    0, 3, 7, 10, 13, 17, 20, 23, 27, 30, 33, 37, 40, 43, 47, 50, 53, 57, 60,
];

/// `24 * 1068`, one subsquare-letter step in `N1`
const SUBSQUARE_1_DIVISOR: u32 = 25_632;

/// One second-subsquare-letter step in `N1`
const SUBSQUARE_2_DIVISOR: u32 = 1_068;

/// Altitude resolution in meters
const ALTITUDE_STEP_M: u32 = 20;

/// `40 * 42 * 2 * 2`, one temperature step in `N2`
const TEMPERATURE_DIVISOR: u32 = 6_720;

/// `42 * 2 * 2`, one battery step in `N2`
const BATTERY_DIVISOR: u32 = 168;

/// `2 * 2`, one speed step in `N2`
const SPEED_DIVISOR: u32 = 4;

/// Speed is transmitted divided by 5
const SPEED_SCALE: u32 = 5;

/// Raw altitudes above this are bogus
pub const ALTITUDE_MAX_M: u32 = 15_000;
/// Reported for altitudes above [`ALTITUDE_MAX_M`]
pub const ALTITUDE_TOO_HIGH: u32 = 9_999;
/// Known decode artifact
pub const ALTITUDE_ARTIFACT_RAW: u32 = 2_760;
/// Reported for [`ALTITUDE_ARTIFACT_RAW`]
pub const ALTITUDE_ARTIFACT: u32 = 9_998;
/// Reported for a raw altitude of zero (no valid altitude)
pub const ALTITUDE_NONE: u32 = 10_000;

/// Telemetry of one position/telemetry spot pair
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTelemetry {
    /// Time of the position spot
    pub time: DateTime<Utc>,
    /// Balloon callsign
    pub call: String,
    /// Latitude of the 6-character locator (south-west corner)
    pub lat: f64,
    /// Longitude of the 6-character locator (south-west corner)
    pub lon: f64,
    /// Position locator extended with the decoded subsquare
    pub locator: String,
    /// Altitude in meters after the sanity policy
    pub altitude_m: u32,
    /// Temperature in °C, one decimal
    pub temperature_c: f64,
    /// Battery in volts, three decimals
    pub battery_v: f64,
    /// Ground speed (native unit, multiple of 5)
    pub speed: u32,
    /// GPS lock flag (0/1)
    pub gps_lock: u8,
    /// Satellite flag (0/1)
    pub satellites: u8,
    /// Unix epoch seconds of the position spot
    pub sequence: i64,
}

/// Power code (0-18) of a standard power level
pub fn power_code(dbm: i32) -> Option<u32> {
    POWER_LEVELS_DBM
        .iter()
        .position(|&level| level == dbm)
        .map(|code| code as u32)
}

/// Apply the altitude sanity policy to a raw decoded altitude
///
/// | Raw | Reported |
/// |-----|----------|
/// | > 15000 | 9999 |
/// | 2760 | 9998 |
/// | 0 | 10000 |
/// | otherwise | unchanged |
pub fn apply_altitude_policy(raw: u32) -> u32 {
    if raw > ALTITUDE_MAX_M {
        info!("Bogus packet, altitude {} m too high, locking to {}", raw, ALTITUDE_TOO_HIGH);
        ALTITUDE_TOO_HIGH
    } else if raw == ALTITUDE_ARTIFACT_RAW {
        info!("Bogus packet, {} m, locking to {}", raw, ALTITUDE_ARTIFACT);
        ALTITUDE_ARTIFACT
    } else if raw == 0 {
        info!("Zero altitude detected, locking to {}", ALTITUDE_NONE);
        ALTITUDE_NONE
    } else {
        raw
    }
}

/// Decode one position/telemetry pair
///
/// # Arguments
///
/// * `position` - Position spot of the balloon (4-character home locator)
/// * `telemetry` - Telemetry-channel spot paired with it
///
/// # Errors
///
/// Returns error if:
/// - The telemetry power is not a standard level (`PowerLookup`)
/// - The telemetry callsign or either locator cannot be indexed (`MalformedTelemetry`)
///
/// # Examples
///
/// ```no_run
/// use wspr_tracker::telemetry::decoder::decode;
/// # fn spots() -> (wspr_tracker::spot::Spot, wspr_tracker::spot::Spot) { unimplemented!() }
///
/// let (position, telemetry) = spots();
/// let decoded = decode(&position, &telemetry)?;
/// println!("{} m", decoded.altitude_m);
/// # Ok::<(), wspr_tracker::error::TrackerError>(())
/// ```
pub fn decode(position: &Spot, telemetry: &Spot) -> Result<DecodedTelemetry> {
    debug!(
        "Decoding {} {} {} + {} {} {} {}",
        position.timestamp, position.tx_call, position.tx_locator,
        telemetry.timestamp, telemetry.tx_call, telemetry.tx_locator, telemetry.power_dbm
    );

    let power = power_code(telemetry.power_dbm)
        .ok_or(TrackerError::PowerLookup(telemetry.power_dbm))?;

    let n1 = callsign_number(&telemetry.tx_call)?;
    let n2 = locator_number(&telemetry.tx_locator)? + power;

    // N1: subsquare letters and altitude
    let sub1 = n1 / SUBSQUARE_1_DIVISOR;
    let rest = n1 % SUBSQUARE_1_DIVISOR;
    let sub2 = rest / SUBSQUARE_2_DIVISOR;
    let altitude_m = apply_altitude_policy((rest % SUBSQUARE_2_DIVISOR) * ALTITUDE_STEP_M);

    // N2: temperature, battery, speed, GPS flags
    let temp_code = n2 / TEMPERATURE_DIVISOR;
    let rest = n2 % TEMPERATURE_DIVISOR;
    let battery_code = rest / BATTERY_DIVISOR;
    let rest = rest % BATTERY_DIVISOR;
    let speed_code = rest / SPEED_DIVISOR;
    let flags = rest % SPEED_DIVISOR;

    let home: String = position.tx_locator.chars().take(4).collect();
    let subsquare = [sub1, sub2]
        .iter()
        .map(|&index| subsquare_letter(index))
        .collect::<Result<String>>()?;
    let locator = format!("{}{}", home, subsquare);
    let (lat, lon) = maidenhead::to_lat_lon(&locator)?;

    let decoded = DecodedTelemetry {
        time: position.timestamp,
        call: position.tx_call.clone(),
        lat,
        lon,
        locator,
        altitude_m,
        temperature_c: round_to(temperature_celsius(temp_code), 1),
        battery_v: round_to(f64::from(battery_code) / 10.0, 3),
        speed: speed_code * SPEED_SCALE,
        gps_lock: (flags / 2) as u8,
        satellites: (flags % 2) as u8,
        sequence: position.timestamp.timestamp(),
    };

    info!(
        "Decoded {} Call: {:>6} Latlon: {:8.5} {:8.5} Loc: {:>6} Alt: {:5} Temp: {:4.1} Batt: {:4.2} Speed: {:3} GPS: {} Sats: {}",
        decoded.time, decoded.call, decoded.lat, decoded.lon, decoded.locator,
        decoded.altitude_m, decoded.temperature_c, decoded.battery_v, decoded.speed,
        decoded.gps_lock, decoded.satellites
    );

    Ok(decoded)
}

/// `(code * 2 + 457) * 500 / 1024 - 273`
fn temperature_celsius(code: u32) -> f64 {
    f64::from(code * 2 + 457) * 500.0 / 1024.0 - 273.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Base-26 number from callsign positions 1, 3, 4 and 5
fn callsign_number(call: &str) -> Result<u32> {
    let chars = call.as_bytes();
    if chars.len() < 6 {
        return Err(TrackerError::MalformedTelemetry(format!(
            "telemetry callsign {:?} shorter than 6 characters",
            call
        )));
    }

    // Digits map to 0-9, letters continue at 10 (ord - '7')
    let c1 = match chars[1] {
        c @ b'0'..=b'9' => u32::from(c - b'0'),
        c @ b'A'..=b'Z' => u32::from(c - b'7'),
        _ => return Err(bad_char(call, 1)),
    };

    let mut n = c1;
    for position in 3..6 {
        let value = match chars[position] {
            c @ b'A'..=b'Z' => u32::from(c - b'A'),
            _ => return Err(bad_char(call, position)),
        };
        n = n * 26 + value;
    }

    Ok(n)
}

/// Mixed-radix number from the 4-character telemetry locator, without power
fn locator_number(locator: &str) -> Result<u32> {
    let chars = locator.as_bytes();
    if chars.len() < 4 {
        return Err(TrackerError::MalformedTelemetry(format!(
            "telemetry locator {:?} shorter than 4 characters",
            locator
        )));
    }

    let letter = |i: usize| match chars[i] {
        c @ b'A'..=b'Z' => Ok(u32::from(c - b'A')),
        _ => Err(bad_char(locator, i)),
    };
    let digit = |i: usize| match chars[i] {
        c @ b'0'..=b'9' => Ok(u32::from(c - b'0')),
        _ => Err(bad_char(locator, i)),
    };

    let l1 = letter(0)?;
    let l2 = letter(1)?;
    let l3 = digit(2)?;
    let l4 = digit(3)?;

    Ok(l1 * 18 * 10 * 10 * 19 + l2 * 10 * 10 * 19 + l3 * 10 * 19 + l4 * 19)
}

fn subsquare_letter(index: u32) -> Result<char> {
    u8::try_from(index)
        .ok()
        .filter(|&i| i < 26)
        .map(|i| char::from(b'a' + i))
        .ok_or_else(|| {
            TrackerError::MalformedTelemetry(format!("subsquare index {} out of range", index))
        })
}

fn bad_char(text: &str, position: usize) -> TrackerError {
    TrackerError::MalformedTelemetry(format!(
        "unexpected character at position {} of {:?}",
        position, text
    ))
}
