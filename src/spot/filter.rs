//! # Balloon Filter
//!
//! Classifies normalized spots as position reports of a tracked balloon or as
//! telemetry-channel reports.
//!
//! Telemetry-channel callsigns are synthetic: the first character is `0`
//! (channels 0-9) or `Q` (channels 10-19), the second character carries data
//! and the third is the channel's last digit. `Q11DCN` is channel 11.
//!
//! Genuine amateur callsigns that happen to fit this shape are classified as
//! telemetry as well; nothing further disambiguates them.

use super::Spot;
use crate::config::BalloonConfig;

/// Number of telemetry channels
pub const CHANNEL_COUNT: u8 = 20;

/// Telemetry channel number (0-19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Create a channel, `None` if out of range
    pub fn new(number: u8) -> Option<Self> {
        (number < CHANNEL_COUNT).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

/// Classify a transmitting callsign as a telemetry-channel callsign
///
/// # Examples
///
/// ```
/// use wspr_tracker::spot::filter::{classify, Channel};
///
/// assert_eq!(classify("Q11DCN"), Channel::new(11));
/// assert_eq!(classify("0A5XYZ"), Channel::new(5));
/// assert_eq!(classify("SA6BSS"), None);
/// ```
pub fn classify(callsign: &str) -> Option<Channel> {
    let bytes = callsign.as_bytes();
    if bytes.len() < 3 {
        return None;
    }

    let base = match bytes[0] {
        b'0' => 0,
        b'Q' => 10,
        _ => return None,
    };

    if !bytes[2].is_ascii_digit() {
        return None;
    }

    Channel::new(base + (bytes[2] - b'0'))
}

/// Whether `spot` is a position report of `balloon`
pub fn is_position_spot(spot: &Spot, balloon: &BalloonConfig) -> bool {
    spot.tx_call == balloon.callsign
}

/// Whether a spot sent by `call` can matter to any tracked balloon
///
/// Cheap pre-check on the raw callsign, used to discard rows before they are
/// normalized.
pub fn is_balloon_call(call: &str, balloons: &[BalloonConfig]) -> bool {
    let call = call.trim();
    classify(call).is_some() || balloons.iter().any(|b| b.callsign == call)
}

/// Keep only balloon position spots and telemetry-channel candidates
///
/// Position spots with a 6-character locator are cut down to the 4-character
/// home locator. A spot is kept once even if it is both a position spot and a
/// telemetry candidate.
pub fn balloon_filter(spots: Vec<Spot>, balloons: &[BalloonConfig]) -> Vec<Spot> {
    let total = spots.len();
    let mut filtered = Vec::new();

    for spot in spots {
        let is_position = balloons.iter().any(|b| is_position_spot(&spot, b));
        let is_telemetry = classify(&spot.tx_call).is_some();

        if is_position {
            filtered.push(home_locator(spot));
        } else if is_telemetry {
            filtered.push(spot);
        }
    }

    tracing::debug!("balloon_filter In: {} Out: {}", total, filtered.len());
    filtered
}

fn home_locator(spot: Spot) -> Spot {
    if spot.tx_locator.chars().count() == 6 {
        Spot {
            tx_locator: spot.tx_locator.chars().take(4).collect(),
            ..spot
        }
    } else {
        spot
    }
}
