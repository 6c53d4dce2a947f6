//! # WSPR Tracker Library
//!
//! Decode high-altitude balloon telemetry from WSPR spots.
//!
//! This library provides the core functionality for pairing a balloon's normal
//! position report with its separately transmitted telemetry-channel report,
//! decoding the telemetry packed into that report's callsign, locator and power
//! fields, and forwarding each decoded sentence downstream at most once.

pub mod config;
pub mod error;
pub mod ledger;
pub mod sink;
pub mod source;
pub mod spot;
pub mod telemetry;
pub mod tracker;
