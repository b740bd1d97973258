//! # Envelope Encoder
//!
//! Serializes a [`MessageEnvelope`] into the flat little-endian wire buffer.

use bytes::BufMut;

use super::types::*;
use crate::error::EncodeError;

/// Encode an envelope into its wire representation
///
/// # Arguments
///
/// * `envelope` - Envelope to serialize
///
/// # Returns
///
/// * `Result<Vec<u8>, EncodeError>` - Tag byte, variant header, then body
///
/// # Errors
///
/// Returns error if:
/// - A batch holds more than 255 records
/// - Debug text is longer than 254 bytes or contains a NUL byte
/// - The payload was decoded from an unrecognized tag or sensor kind
///
/// # Examples
///
/// ```
/// use equine_telemetry::protocol::encoder::encode_envelope;
/// use equine_telemetry::protocol::types::*;
///
/// let batch = SensorBatch {
///     end_timestamp_rel: 40,
///     sample_interval_ms: 200,
///     records: SensorRecords::HeartRate(vec![HeartRateRecord { bpm: 38 }]),
/// };
/// let bytes = encode_envelope(&MessageEnvelope::new(50, Payload::SensorData(batch))).unwrap();
/// assert_eq!(bytes.len(), 1 + 12 + 1);
/// ```
pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::with_capacity(encoded_len(envelope));
    buf.put_u8(envelope.tag().to_byte());

    match &envelope.payload {
        Payload::SensorData(batch) => {
            encode_sensor_batch(&mut buf, envelope.base_timestamp_rel, batch)?
        }
        Payload::SensorConfig(config) => {
            encode_config_batch(&mut buf, envelope.base_timestamp_rel, config)?
        }
        Payload::Debug(record) => encode_debug(&mut buf, envelope.base_timestamp_rel, record)?,
        Payload::Unrecognized(tag) => return Err(EncodeError::Unrecognized(*tag)),
    }

    Ok(buf)
}

/// Number of bytes `encode_envelope` will produce for a valid envelope
pub fn encoded_len(envelope: &MessageEnvelope) -> usize {
    1 + match &envelope.payload {
        Payload::SensorData(batch) => {
            let width = batch.kind().record_width().unwrap_or(0);
            SENSOR_HEADER_SIZE + batch.records.len() * width
        }
        Payload::SensorConfig(config) => {
            CONFIG_HEADER_SIZE + config.entries.len() * CONFIG_ENTRY_SIZE
        }
        Payload::Debug(record) => DEBUG_HEADER_SIZE + record.message.len() + 1,
        Payload::Unrecognized(_) => 0,
    }
}

fn encode_sensor_batch(
    buf: &mut Vec<u8>,
    base_timestamp_rel: u32,
    batch: &SensorBatch,
) -> Result<(), EncodeError> {
    let count = batch.records.len();
    if count > MAX_RECORDS {
        return Err(EncodeError::TooManyRecords {
            count,
            max: MAX_RECORDS,
        });
    }
    // Header: base_ts, kind, end_ts, interval, len
    buf.put_u32_le(base_timestamp_rel);
    buf.put_u8(batch.kind().to_byte());
    buf.put_u32_le(batch.end_timestamp_rel);
    buf.put_u16_le(batch.sample_interval_ms);
    buf.put_u8(count as u8);

    match &batch.records {
        SensorRecords::HeartRate(records) => {
            for r in records {
                buf.put_u8(r.bpm);
            }
        }
        SensorRecords::RawTemperature(records) => {
            for r in records {
                buf.put_f64_le(r.v_obj);
                buf.put_f64_le(r.t_env);
            }
        }
        SensorRecords::Accelerometer(records) => {
            for r in records {
                buf.put_i16_le(r.x);
                buf.put_i16_le(r.y);
                buf.put_i16_le(r.z);
            }
        }
        SensorRecords::Gps(records) => {
            for r in records {
                buf.put_u8(r.lat_deg);
                buf.put_u8(r.lat_min);
                buf.put_u8(r.lat_sec);
                buf.put_u8(r.lat_north as u8);
                buf.put_u8(r.lon_deg);
                buf.put_u8(r.lon_min);
                buf.put_u8(r.lon_sec);
                buf.put_u8(r.lon_west as u8);
                buf.put_u8(r.valid_fix as u8);
            }
        }
        SensorRecords::Unrecognized { kind, .. } => return Err(EncodeError::Unrecognized(*kind)),
    }

    Ok(())
}

fn encode_config_batch(
    buf: &mut Vec<u8>,
    base_timestamp_rel: u32,
    config: &ConfigBatch,
) -> Result<(), EncodeError> {
    let count = config.entries.len();
    if count > MAX_RECORDS {
        return Err(EncodeError::TooManyRecords {
            count,
            max: MAX_RECORDS,
        });
    }

    buf.put_u32_le(base_timestamp_rel);
    buf.put_u8(count as u8);
    for entry in &config.entries {
        buf.put_u8(entry.sensor_tag);
        buf.put_u16_le(entry.sample_interval_ms);
        buf.put_u8(entry.enabled as u8);
    }

    Ok(())
}

fn encode_debug(
    buf: &mut Vec<u8>,
    base_timestamp_rel: u32,
    record: &DebugRecord,
) -> Result<(), EncodeError> {
    let text = record.message.as_bytes();
    if text.len() > DEBUG_TEXT_MAX {
        return Err(EncodeError::DebugTextTooLong {
            len: text.len(),
            max: DEBUG_TEXT_MAX,
        });
    }
    if let Some(pos) = text.iter().position(|&b| b == DEBUG_TERMINATOR) {
        return Err(EncodeError::EmbeddedNul(pos));
    }

    buf.put_u32_le(base_timestamp_rel);
    buf.put_u32_le(record.timestamp_rel);
    buf.put_slice(text);
    buf.put_u8(DEBUG_TERMINATOR);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heart_envelope(bpms: &[u8]) -> MessageEnvelope {
        MessageEnvelope::new(
            0x0102_0304,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 0x0A0B_0C0D,
                sample_interval_ms: 0x01F4,
                records: SensorRecords::HeartRate(
                    bpms.iter().map(|&bpm| HeartRateRecord { bpm }).collect(),
                ),
            }),
        )
    }

    #[test]
    fn test_sensor_header_layout() {
        let bytes = encode_envelope(&heart_envelope(&[60, 61])).unwrap();

        assert_eq!(
            bytes,
            vec![
                TAG_SENSOR_DATA,
                0x04, 0x03, 0x02, 0x01, // base_ts LE
                KIND_HEART_RATE,
                0x0D, 0x0C, 0x0B, 0x0A, // end_ts LE
                0xF4, 0x01, // interval LE
                2,    // array length
                60, 61,
            ]
        );
    }

    #[test]
    fn test_accelerometer_records_little_endian() {
        let env = MessageEnvelope::new(
            1,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 1,
                sample_interval_ms: 10,
                records: SensorRecords::Accelerometer(vec![AccelerometerRecord {
                    x: -2,
                    y: 0x0102,
                    z: i16::MIN,
                }]),
            }),
        );
        let bytes = encode_envelope(&env).unwrap();
        let body = &bytes[1 + SENSOR_HEADER_SIZE..];

        assert_eq!(body, &[0xFE, 0xFF, 0x02, 0x01, 0x00, 0x80]);
    }

    #[test]
    fn test_gps_flags_are_single_bytes() {
        let env = MessageEnvelope::new(
            1,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 1,
                sample_interval_ms: 1000,
                records: SensorRecords::Gps(vec![GpsRecord {
                    lat_deg: 50,
                    lat_min: 54,
                    lat_sec: 30,
                    lat_north: true,
                    lon_deg: 1,
                    lon_min: 24,
                    lon_sec: 15,
                    lon_west: true,
                    valid_fix: false,
                }]),
            }),
        );
        let bytes = encode_envelope(&env).unwrap();

        assert_eq!(&bytes[1 + SENSOR_HEADER_SIZE..], &[50, 54, 30, 1, 1, 24, 15, 1, 0]);
    }

    #[test]
    fn test_debug_text_is_nul_terminated() {
        let env = MessageEnvelope::new(
            100,
            Payload::Debug(DebugRecord {
                timestamp_rel: 99,
                message: "low battery".to_string(),
            }),
        );
        let bytes = encode_envelope(&env).unwrap();

        assert_eq!(bytes[0], TAG_DEBUG);
        assert_eq!(&bytes[1..5], &100u32.to_le_bytes());
        assert_eq!(&bytes[5..9], &99u32.to_le_bytes());
        assert_eq!(&bytes[9..20], b"low battery");
        assert_eq!(*bytes.last().unwrap(), DEBUG_TERMINATOR);
        assert_eq!(bytes.len(), encoded_len(&env));
    }

    #[test]
    fn test_debug_text_rejects_embedded_nul() {
        let env = MessageEnvelope::new(
            1,
            Payload::Debug(DebugRecord {
                timestamp_rel: 1,
                message: "a\0b".to_string(),
            }),
        );
        assert_eq!(encode_envelope(&env), Err(EncodeError::EmbeddedNul(1)));
    }

    #[test]
    fn test_debug_text_too_long() {
        let env = MessageEnvelope::new(
            1,
            Payload::Debug(DebugRecord {
                timestamp_rel: 1,
                message: "x".repeat(DEBUG_TEXT_MAX + 1),
            }),
        );
        assert!(matches!(
            encode_envelope(&env),
            Err(EncodeError::DebugTextTooLong { .. })
        ));
    }

    #[test]
    fn test_too_many_records() {
        let bpms = vec![70u8; MAX_RECORDS + 1];
        assert_eq!(
            encode_envelope(&heart_envelope(&bpms)),
            Err(EncodeError::TooManyRecords { count: 256, max: 255 })
        );
    }

    #[test]
    fn test_config_batch_layout() {
        let env = MessageEnvelope::new(
            7,
            Payload::SensorConfig(ConfigBatch {
                entries: vec![ConfigEntry {
                    sensor_tag: KIND_GPS,
                    sample_interval_ms: 5000,
                    enabled: true,
                }],
            }),
        );
        let bytes = encode_envelope(&env).unwrap();

        assert_eq!(bytes, vec![TAG_SENSOR_CONFIG, 7, 0, 0, 0, 1, KIND_GPS, 0x88, 0x13, 1]);
    }

    #[test]
    fn test_unrecognized_payload_is_not_encodable() {
        let env = MessageEnvelope::new(1, Payload::Unrecognized(9));
        assert_eq!(encode_envelope(&env), Err(EncodeError::Unrecognized(9)));
    }

    #[test]
    fn test_unrecognized_sensor_kind_is_not_encodable() {
        let env = MessageEnvelope::new(
            1,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 1,
                sample_interval_ms: 10,
                records: SensorRecords::Unrecognized {
                    kind: 0x42,
                    declared_len: 3,
                },
            }),
        );
        assert_eq!(encode_envelope(&env), Err(EncodeError::Unrecognized(0x42)));
    }
}
