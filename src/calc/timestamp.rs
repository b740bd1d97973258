//! # Timestamp Reconciliation
//!
//! Nodes have no dependable real-time clock, so every timestamp they send is
//! relative to their own free-running counter. The envelope carries the
//! counter value at send time (`R`); each batch or debug record carries the
//! counter value when it was produced (`E`). The gateway anchors both against
//! its own wall clock on receipt:
//!
//! ```text
//! absolute_end = now - (R - E)
//! sample_i     = absolute_end * 1000 - i * interval_ms      (milliseconds)
//! ```
//!
//! Index 0 is the most recent sample. Storage keeps `absolute_end` and the
//! per-sample offset `-(i * interval_ms)` in separate columns so the raw
//! sampling cadence survives.

use chrono::Utc;

/// Source of the gateway's wall-clock time in Unix seconds
pub trait Clock: Send {
    fn now(&self) -> i64;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock frozen at a fixed instant, for replay and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Absolute time (Unix seconds) of a node event
///
/// # Arguments
///
/// * `now` - Gateway wall-clock time at receipt
/// * `envelope_rel` - Node counter when the envelope was sent (`R`)
/// * `event_rel` - Node counter when the batch ended or the debug line was written (`E`)
///
/// # Examples
///
/// ```
/// use equine_telemetry::calc::timestamp::absolute_end;
///
/// assert_eq!(absolute_end(1000, 50, 40), 990);
/// ```
pub fn absolute_end(now: i64, envelope_rel: u32, event_rel: u32) -> i64 {
    now - (i64::from(envelope_rel) - i64::from(event_rel))
}

/// Offset of sample `index` from the batch end, in milliseconds (zero or negative)
pub fn sample_offset_ms(index: usize, interval_ms: u16) -> i64 {
    -(index as i64 * i64::from(interval_ms))
}

/// Absolute time of sample `index` in Unix milliseconds
///
/// # Examples
///
/// ```
/// use equine_telemetry::calc::timestamp::sample_time_ms;
///
/// assert_eq!(sample_time_ms(990, 3, 200), 990_000 - 600);
/// ```
pub fn sample_time_ms(absolute_end: i64, index: usize, interval_ms: u16) -> i64 {
    absolute_end * 1000 + sample_offset_ms(index, interval_ms)
}
