//! # Wire Protocol Constants and Types
//!
//! Core message definitions exchanged between sensor nodes and the gateway.
//!
//! All multi-byte fields are little-endian and packed without padding.
//!
//! ```text
//! Envelope:  [tag:1][variant header][record array | debug text]
//! Fragment:  [tag:1][part:1][part_count:1][payload_len:1][payload:payload_len]
//! ```

use std::fmt;

/// Envelope tag for sensor data batches
pub const TAG_SENSOR_DATA: u8 = 0;

/// Envelope tag for sensor configuration batches
pub const TAG_SENSOR_CONFIG: u8 = 1;

/// Envelope tag for debug messages
pub const TAG_DEBUG: u8 = 2;

/// Sensor kind tag for heart rate batches
pub const KIND_HEART_RATE: u8 = 0;

/// Sensor kind tag for raw thermopile batches
pub const KIND_RAW_TEMPERATURE: u8 = 1;

/// Sensor kind tag for accelerometer batches
pub const KIND_ACCELEROMETER: u8 = 2;

/// Sensor kind tag for GPS batches
pub const KIND_GPS: u8 = 3;

/// SensorData header after the tag byte:
/// base_ts(4) + kind(1) + end_ts(4) + interval_ms(2) + len(1)
pub const SENSOR_HEADER_SIZE: usize = 12;

/// SensorConfig header after the tag byte: base_ts(4) + count(1)
pub const CONFIG_HEADER_SIZE: usize = 5;

/// Debug header after the tag byte: base_ts(4) + ts(4)
pub const DEBUG_HEADER_SIZE: usize = 8;

/// Bytes per heart rate record
pub const HEART_RATE_RECORD_SIZE: usize = 1;

/// Bytes per raw temperature record (two f64)
pub const RAW_TEMPERATURE_RECORD_SIZE: usize = 16;

/// Bytes per accelerometer record (three i16)
pub const ACCELEROMETER_RECORD_SIZE: usize = 6;

/// Bytes per GPS record (nine u8)
pub const GPS_RECORD_SIZE: usize = 9;

/// Bytes per configuration entry: sensor_tag(1) + interval_ms(2) + enabled(1)
pub const CONFIG_ENTRY_SIZE: usize = 4;

/// Maximum records in a batch (one-byte array length)
pub const MAX_RECORDS: usize = 255;

/// Maximum debug text length, leaving room for the NUL terminator
pub const DEBUG_TEXT_MAX: usize = 254;

/// Terminator written after debug text
pub const DEBUG_TERMINATOR: u8 = 0x00;

/// Outermost message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeTag {
    SensorData,
    SensorConfig,
    Debug,
    /// Tag byte not defined by this protocol version
    Unrecognized(u8),
}

impl EnvelopeTag {
    /// Wire value of the tag
    pub fn to_byte(self) -> u8 {
        match self {
            EnvelopeTag::SensorData => TAG_SENSOR_DATA,
            EnvelopeTag::SensorConfig => TAG_SENSOR_CONFIG,
            EnvelopeTag::Debug => TAG_DEBUG,
            EnvelopeTag::Unrecognized(tag) => tag,
        }
    }
}

impl From<u8> for EnvelopeTag {
    fn from(byte: u8) -> Self {
        match byte {
            TAG_SENSOR_DATA => EnvelopeTag::SensorData,
            TAG_SENSOR_CONFIG => EnvelopeTag::SensorConfig,
            TAG_DEBUG => EnvelopeTag::Debug,
            other => EnvelopeTag::Unrecognized(other),
        }
    }
}

impl fmt::Display for EnvelopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeTag::SensorData => write!(f, "sensor-data"),
            EnvelopeTag::SensorConfig => write!(f, "sensor-config"),
            EnvelopeTag::Debug => write!(f, "debug"),
            EnvelopeTag::Unrecognized(tag) => write!(f, "unrecognized(0x{:02X})", tag),
        }
    }
}

/// Sensor kind carried inside a sensor data batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    HeartRate,
    RawTemperature,
    Accelerometer,
    Gps,
    /// Kind byte not defined by this protocol version
    Unrecognized(u8),
}

impl SensorKind {
    /// Wire value of the kind
    pub fn to_byte(self) -> u8 {
        match self {
            SensorKind::HeartRate => KIND_HEART_RATE,
            SensorKind::RawTemperature => KIND_RAW_TEMPERATURE,
            SensorKind::Accelerometer => KIND_ACCELEROMETER,
            SensorKind::Gps => KIND_GPS,
            SensorKind::Unrecognized(kind) => kind,
        }
    }

    /// Fixed width of one record of this kind, if the kind is known
    pub fn record_width(self) -> Option<usize> {
        match self {
            SensorKind::HeartRate => Some(HEART_RATE_RECORD_SIZE),
            SensorKind::RawTemperature => Some(RAW_TEMPERATURE_RECORD_SIZE),
            SensorKind::Accelerometer => Some(ACCELEROMETER_RECORD_SIZE),
            SensorKind::Gps => Some(GPS_RECORD_SIZE),
            SensorKind::Unrecognized(_) => None,
        }
    }
}

impl From<u8> for SensorKind {
    fn from(byte: u8) -> Self {
        match byte {
            KIND_HEART_RATE => SensorKind::HeartRate,
            KIND_RAW_TEMPERATURE => SensorKind::RawTemperature,
            KIND_ACCELEROMETER => SensorKind::Accelerometer,
            KIND_GPS => SensorKind::Gps,
            other => SensorKind::Unrecognized(other),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::HeartRate => write!(f, "heart-rate"),
            SensorKind::RawTemperature => write!(f, "raw-temperature"),
            SensorKind::Accelerometer => write!(f, "accelerometer"),
            SensorKind::Gps => write!(f, "gps"),
            SensorKind::Unrecognized(kind) => write!(f, "unrecognized(0x{:02X})", kind),
        }
    }
}

/// Heart rate sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartRateRecord {
    /// Beats per minute
    pub bpm: u8,
}

/// Raw thermopile sample, calibrated at the gateway
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTemperatureRecord {
    /// Thermopile sensor voltage in volts
    pub v_obj: f64,

    /// Die (ambient) temperature in kelvin
    pub t_env: f64,
}

/// Three-axis acceleration sample (raw sensor counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerometerRecord {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// GPS fix in degrees, minutes and seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsRecord {
    pub lat_deg: u8,
    pub lat_min: u8,
    pub lat_sec: u8,

    /// Northern hemisphere when set
    pub lat_north: bool,

    pub lon_deg: u8,
    pub lon_min: u8,
    pub lon_sec: u8,

    /// Western hemisphere when set
    pub lon_west: bool,

    /// Receiver reported a valid position fix
    pub valid_fix: bool,
}

/// Typed record array of a sensor batch
///
/// The variant is the sensor kind, so a batch can never hold records of a
/// kind other than the one it declares.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorRecords {
    HeartRate(Vec<HeartRateRecord>),
    RawTemperature(Vec<RawTemperatureRecord>),
    Accelerometer(Vec<AccelerometerRecord>),
    Gps(Vec<GpsRecord>),
    /// Unknown kind: header survived, records were not copied
    Unrecognized {
        kind: u8,
        declared_len: u8,
    },
}

impl SensorRecords {
    /// Sensor kind these records belong to
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorRecords::HeartRate(_) => SensorKind::HeartRate,
            SensorRecords::RawTemperature(_) => SensorKind::RawTemperature,
            SensorRecords::Accelerometer(_) => SensorKind::Accelerometer,
            SensorRecords::Gps(_) => SensorKind::Gps,
            SensorRecords::Unrecognized { kind, .. } => SensorKind::Unrecognized(*kind),
        }
    }

    /// Number of records actually present
    pub fn len(&self) -> usize {
        match self {
            SensorRecords::HeartRate(r) => r.len(),
            SensorRecords::RawTemperature(r) => r.len(),
            SensorRecords::Accelerometer(r) => r.len(),
            SensorRecords::Gps(r) => r.len(),
            SensorRecords::Unrecognized { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batch of samples from one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorBatch {
    /// Node clock reading (seconds) when the last sample was taken
    pub end_timestamp_rel: u32,

    /// Spacing between consecutive samples in milliseconds
    pub sample_interval_ms: u16,

    /// Samples, index 0 being the most recent
    pub records: SensorRecords,
}

impl SensorBatch {
    pub fn kind(&self) -> SensorKind {
        self.records.kind()
    }
}

/// Per-sensor configuration entry (reserved, not processed by the gateway)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigEntry {
    pub sensor_tag: u8,
    pub sample_interval_ms: u16,
    pub enabled: bool,
}

/// Configuration batch (reserved)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBatch {
    pub entries: Vec<ConfigEntry>,
}

/// Free-text diagnostic from a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRecord {
    /// Node clock reading (seconds) when the message was produced
    pub timestamp_rel: u32,

    pub message: String,
}

/// Envelope body; the variant determines the envelope tag
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    SensorData(SensorBatch),
    SensorConfig(ConfigBatch),
    Debug(DebugRecord),
    /// Unknown tag: only the tag byte was understood
    Unrecognized(u8),
}

/// Outermost message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    /// Node clock reading (seconds) when the envelope was sent
    pub base_timestamp_rel: u32,

    pub payload: Payload,
}

impl MessageEnvelope {
    /// Create a new envelope
    pub fn new(base_timestamp_rel: u32, payload: Payload) -> Self {
        Self {
            base_timestamp_rel,
            payload,
        }
    }

    /// Envelope tag, derived from the payload variant
    pub fn tag(&self) -> EnvelopeTag {
        match &self.payload {
            Payload::SensorData(_) => EnvelopeTag::SensorData,
            Payload::SensorConfig(_) => EnvelopeTag::SensorConfig,
            Payload::Debug(_) => EnvelopeTag::Debug,
            Payload::Unrecognized(tag) => EnvelopeTag::Unrecognized(*tag),
        }
    }
}

/// Radio address of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    /// Hardware address, fixed for the lifetime of the radio
    pub addr64: u64,

    /// Network address, reassigned on every join
    pub addr16: u16,

    /// Human readable node identifier, if known
    pub identifier: Option<String>,
}

impl NodeAddress {
    pub fn new(addr64: u64, addr16: u16) -> Self {
        Self {
            addr64,
            addr16,
            identifier: None,
        }
    }

    pub fn with_identifier(addr64: u64, addr16: u16, identifier: impl Into<String>) -> Self {
        Self {
            addr64,
            addr16,
            identifier: Some(identifier.into()),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}/{:04X}", self.addr64, self.addr16)?;
        if let Some(id) = &self.identifier {
            write!(f, " ({})", id)?;
        }
        Ok(())
    }
}
