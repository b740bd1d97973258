//! # Error Types
//!
//! Custom error types for the telemetry gateway using `thiserror`.
//!
//! Only [`TelemetryError::Config`], [`TelemetryError::Io`] and
//! [`TelemetryError::Radio`] raised while opening the transport are fatal.
//! Decode, fragment and store errors are reported per message and the
//! receive loop carries on.

use thiserror::Error;

/// Main error type for the telemetry gateway
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Wire codec decode errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Wire codec encode errors
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Fragmentation and reassembly errors
    #[error("Fragment error: {0}")]
    Fragment(#[from] FragmentError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Radio transport errors
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while decoding a reassembled buffer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer contained no bytes at all
    #[error("empty buffer")]
    Empty,

    /// Buffer ended before a header or record was complete
    #[error("truncated buffer: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Errors while encoding an envelope
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// More records than the one-byte array length can describe
    #[error("too many records: {count} exceeds maximum {max}")]
    TooManyRecords { count: usize, max: usize },

    /// Debug text longer than the wire limit
    #[error("debug text too long: {len} bytes exceeds maximum {max}")]
    DebugTextTooLong { len: usize, max: usize },

    /// Debug text would be cut short by the decoder's terminator scan
    #[error("debug text contains an embedded NUL at byte {0}")]
    EmbeddedNul(usize),

    /// Payloads that were decoded from an unknown tag cannot be re-emitted
    #[error("cannot encode unrecognized tag 0x{0:02X}")]
    Unrecognized(u8),
}

/// Errors raised by the fragment engine
///
/// All of these are non-fatal: the offending frame is dropped and the
/// receive loop continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentError {
    /// Frame shorter than the fixed fragment header
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Header fields that can never be valid
    #[error("invalid fragment header: {0}")]
    InvalidHeader(String),

    /// Declared payload length larger than the bytes actually received
    #[error("declared payload length {declared} exceeds {available} received bytes")]
    PayloadOverrun { declared: usize, available: usize },

    /// MTU leaves no room for payload, or does not fit the header's length byte
    #[error("invalid MTU {0}")]
    InvalidMtu(usize),

    /// Buffer needs more parts than the one-byte part counter allows
    #[error("payload of {len} bytes needs {parts} fragments (max 255)")]
    TooManyParts { len: usize, parts: usize },

    /// Fragment arrived out of sequence; the session buffer was discarded
    #[error("out of sequence: expected part {expected}, got {received} of {count}")]
    OutOfSequence { expected: u8, received: u8, count: u8 },

    /// No session exists and this fragment may not start one
    #[error("part {received} of {count} cannot start a new message")]
    NotSeed { received: u8, count: u8 },
}

/// Errors raised by a relational store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend rejected or failed to execute the statement
    #[error("statement on {table} failed: {reason}")]
    Execute { table: String, reason: String },

    /// Store was used after `close`
    #[error("store is closed")]
    Closed,

    /// Serialization failure in a file-backed store
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O failure in a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the radio transport
#[derive(Debug, Error)]
pub enum RadioError {
    /// Serial device could not be opened or configured
    #[error("failed to open radio on {path}: {reason}")]
    Open { path: String, reason: String },

    /// Read or write on an open device failed
    #[error("radio I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API frame could not be parsed
    #[error("malformed API frame: {0}")]
    Frame(String),

    /// Frame payload larger than the radio accepts
    #[error("frame of {len} bytes exceeds radio MTU {mtu}")]
    FrameTooLarge { len: usize, mtu: usize },

    /// Radio did not answer an AT command in time
    #[error("no response to AT command {0}")]
    NoResponse(String),
}

/// Result type alias for the telemetry gateway
pub type Result<T> = std::result::Result<T, TelemetryError>;
