//! # Equine Telemetry
//!
//! Gateway side of a mesh-radio telemetry network for animal-borne sensor nodes.
//!
//! This library provides the compact wire codec spoken by the nodes, the
//! fragmentation layer that fits messages into radio frames, timestamp
//! reconciliation for nodes without a real-time clock, GPS and thermopile
//! calculations, and the mapping of decoded messages onto relational tables.

pub mod calc;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod radio;
pub mod storage;
