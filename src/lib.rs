//! Zigbee Smart Energy Demand Response and Load Control client.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
/// DRLC event table, protocol handler, and wire codec.
pub mod drlc;
pub mod error;
pub mod esi;
pub mod io;
/// Simulated clock, scripted engine, and run summary.
pub mod sim;
pub mod stack;
pub mod zcl;
