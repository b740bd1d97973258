//! # Envelope Decoder
//!
//! Parses a reassembled wire buffer back into a [`MessageEnvelope`].
//!
//! Decoding never reads past the end of the buffer it is given. Unknown
//! envelope tags and sensor kinds are not errors: the header is returned with
//! no records and a [`DecodeWarning`] describing what was skipped.

use std::fmt;

use bytes::Buf;

use super::types::*;
use crate::error::DecodeError;

/// Non-fatal problem found while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeWarning {
    /// Envelope tag not defined by this protocol version
    UnrecognizedTag(u8),

    /// Sensor kind not defined; `declared_len` records were skipped
    UnrecognizedSensorKind { kind: u8, declared_len: u8 },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::UnrecognizedTag(tag) => {
                write!(f, "unrecognized envelope tag 0x{:02X}", tag)
            }
            DecodeWarning::UnrecognizedSensorKind { kind, declared_len } => write!(
                f,
                "unrecognized sensor kind 0x{:02X}, skipped {} records",
                kind, declared_len
            ),
        }
    }
}

/// Result of a successful decode
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEnvelope {
    pub envelope: MessageEnvelope,
    pub warning: Option<DecodeWarning>,
}

/// Decode a complete wire buffer
///
/// # Arguments
///
/// * `buf` - Reassembled payload bytes (tag byte first)
///
/// # Returns
///
/// * `Result<DecodedEnvelope, DecodeError>` - Envelope plus an optional warning
///
/// # Errors
///
/// Returns error if:
/// - Buffer is empty
/// - Buffer ends inside the variant header or the record array
pub fn decode_envelope(buf: &[u8]) -> Result<DecodedEnvelope, DecodeError> {
    let mut cursor = buf;
    if !cursor.has_remaining() {
        return Err(DecodeError::Empty);
    }

    let tag = EnvelopeTag::from(cursor.get_u8());
    match tag {
        EnvelopeTag::SensorData => decode_sensor_data(cursor),
        EnvelopeTag::SensorConfig => decode_config(cursor),
        EnvelopeTag::Debug => decode_debug(cursor),
        EnvelopeTag::Unrecognized(byte) => {
            // Every known variant starts with the base timestamp, keep it if present
            let base = if cursor.remaining() >= 4 {
                cursor.get_u32_le()
            } else {
                0
            };
            Ok(DecodedEnvelope {
                envelope: MessageEnvelope::new(base, Payload::Unrecognized(byte)),
                warning: Some(DecodeWarning::UnrecognizedTag(byte)),
            })
        }
    }
}

fn ensure(cursor: &[u8], needed: usize, consumed: usize) -> Result<(), DecodeError> {
    if cursor.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed: consumed + needed,
            available: consumed + cursor.remaining(),
        });
    }
    Ok(())
}

fn decode_sensor_data(mut cursor: &[u8]) -> Result<DecodedEnvelope, DecodeError> {
    ensure(cursor, SENSOR_HEADER_SIZE, 1)?;

    let base = cursor.get_u32_le();
    let kind = SensorKind::from(cursor.get_u8());
    let end_timestamp_rel = cursor.get_u32_le();
    let sample_interval_ms = cursor.get_u16_le();
    let count = cursor.get_u8();

    let header_len = 1 + SENSOR_HEADER_SIZE;
    let mut warning = None;

    let records = match kind.record_width() {
        Some(width) => {
            ensure(cursor, count as usize * width, header_len)?;
            read_records(&mut cursor, kind, count as usize)
        }
        None => {
            let kind = kind.to_byte();
            warning = Some(DecodeWarning::UnrecognizedSensorKind {
                kind,
                declared_len: count,
            });
            SensorRecords::Unrecognized {
                kind,
                declared_len: count,
            }
        }
    };

    Ok(DecodedEnvelope {
        envelope: MessageEnvelope::new(
            base,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel,
                sample_interval_ms,
                records,
            }),
        ),
        warning,
    })
}

/// Caller guarantees `count` records of the kind's width are available
fn read_records(cursor: &mut &[u8], kind: SensorKind, count: usize) -> SensorRecords {
    match kind {
        SensorKind::HeartRate => SensorRecords::HeartRate(
            (0..count)
                .map(|_| HeartRateRecord { bpm: cursor.get_u8() })
                .collect(),
        ),
        SensorKind::RawTemperature => SensorRecords::RawTemperature(
            (0..count)
                .map(|_| RawTemperatureRecord {
                    v_obj: cursor.get_f64_le(),
                    t_env: cursor.get_f64_le(),
                })
                .collect(),
        ),
        SensorKind::Accelerometer => SensorRecords::Accelerometer(
            (0..count)
                .map(|_| AccelerometerRecord {
                    x: cursor.get_i16_le(),
                    y: cursor.get_i16_le(),
                    z: cursor.get_i16_le(),
                })
                .collect(),
        ),
        SensorKind::Gps => SensorRecords::Gps(
            (0..count)
                .map(|_| GpsRecord {
                    lat_deg: cursor.get_u8(),
                    lat_min: cursor.get_u8(),
                    lat_sec: cursor.get_u8(),
                    lat_north: cursor.get_u8() != 0,
                    lon_deg: cursor.get_u8(),
                    lon_min: cursor.get_u8(),
                    lon_sec: cursor.get_u8(),
                    lon_west: cursor.get_u8() != 0,
                    valid_fix: cursor.get_u8() != 0,
                })
                .collect(),
        ),
        SensorKind::Unrecognized(kind) => SensorRecords::Unrecognized {
            kind,
            declared_len: count as u8,
        },
    }
}

fn decode_config(mut cursor: &[u8]) -> Result<DecodedEnvelope, DecodeError> {
    ensure(cursor, CONFIG_HEADER_SIZE, 1)?;

    let base = cursor.get_u32_le();
    let count = cursor.get_u8() as usize;
    ensure(cursor, count * CONFIG_ENTRY_SIZE, 1 + CONFIG_HEADER_SIZE)?;

    let entries = (0..count)
        .map(|_| ConfigEntry {
            sensor_tag: cursor.get_u8(),
            sample_interval_ms: cursor.get_u16_le(),
            enabled: cursor.get_u8() != 0,
        })
        .collect();

    Ok(DecodedEnvelope {
        envelope: MessageEnvelope::new(base, Payload::SensorConfig(ConfigBatch { entries })),
        warning: None,
    })
}

fn decode_debug(mut cursor: &[u8]) -> Result<DecodedEnvelope, DecodeError> {
    ensure(cursor, DEBUG_HEADER_SIZE, 1)?;

    let base = cursor.get_u32_le();
    let timestamp_rel = cursor.get_u32_le();

    // Text runs to the terminator, or to the end of the buffer if it was cut off
    let text = match cursor.iter().position(|&b| b == DEBUG_TERMINATOR) {
        Some(end) => &cursor[..end],
        None => cursor,
    };
    let text = &text[..text.len().min(DEBUG_TEXT_MAX)];

    Ok(DecodedEnvelope {
        envelope: MessageEnvelope::new(
            base,
            Payload::Debug(DebugRecord {
                timestamp_rel,
                message: String::from_utf8_lossy(text).into_owned(),
            }),
        ),
        warning: None,
    })
}
