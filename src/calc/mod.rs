//! # Derived Values
//!
//! Gateway-side calculations applied to decoded sensor batches before storage.
//!
//! This module handles:
//! - Reconciling relative node clocks against the gateway clock
//! - Converting sexagesimal GPS fixes to signed decimal degrees
//! - Calibrating raw thermopile readings into object temperature

pub mod timestamp;
pub mod gps;
pub mod thermopile;
