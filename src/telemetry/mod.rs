//! # Telemetry Module
//!
//! Reconstructs balloon telemetry from paired WSPR spots.
//!
//! This module handles:
//! - Pairing position spots with telemetry-channel spots inside the 8 minute window
//! - Decoding the mixed-radix telemetry packed into callsign, locator and power
//! - Converting 6-character Maidenhead locators to latitude/longitude
//! - Building the checksummed delivery sentence

pub mod correlator;
pub mod decoder;
pub mod maidenhead;
pub mod sentence;

pub use decoder::DecodedTelemetry;
