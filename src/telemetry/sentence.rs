//! # Delivery Sentence
//!
//! UKHAS-style telemetry sentence with an XOR checksum:
//!
//! ```text
//! $$name,seq,HH:MM,lat,lon,alt,speed,temp,batt,gps,sats*cs
//! ```
//!
//! The checksum is the XOR of every byte before `*`, printed as lowercase hex
//! without zero padding. The leading `$$` cancels out of the XOR.

use super::decoder::DecodedTelemetry;

/// XOR of every byte in `data`
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &byte| acc ^ byte)
}

/// Build the delivery sentence for one decoded telemetry record
///
/// # Examples
///
/// ```no_run
/// use wspr_tracker::telemetry::sentence::build_sentence;
/// # fn decoded() -> wspr_tracker::telemetry::DecodedTelemetry { unimplemented!() }
///
/// let sentence = build_sentence("SA6BSS-11", &decoded());
/// assert!(sentence.starts_with("$$SA6BSS-11,"));
/// ```
pub fn build_sentence(payload_name: &str, telemetry: &DecodedTelemetry) -> String {
    let body = format!(
        "{},{},{},{:.5},{:.5},{},{},{:.2},{:.2},{},{}",
        payload_name,
        telemetry.sequence,
        telemetry.time.format("%H:%M"),
        telemetry.lat,
        telemetry.lon,
        telemetry.altitude_m,
        telemetry.speed,
        telemetry.temperature_c,
        telemetry.battery_v,
        telemetry.gps_lock,
        telemetry.satellites,
    );

    let sentence = format!("$${}", body);
    let checksum = xor_checksum(sentence.as_bytes());
    format!("{}*{:x}", sentence, checksum)
}
