//! # Sensor Message Protocol
//!
//! Application-level protocol spoken between sensor nodes and the gateway.
//!
//! This module handles:
//! - Envelope and sensor batch data model
//! - Bit-exact little-endian wire encoding and decoding
//! - MTU-bounded fragmentation and in-order reassembly

pub mod types;
pub mod encoder;
pub mod decoder;
pub mod fragment;
