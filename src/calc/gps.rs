//! # GPS Conversion
//!
//! Converts degree/minute/second fixes into signed decimal degrees.
//! Southern latitudes and western longitudes are negative.

use crate::protocol::types::GpsRecord;

/// Position in signed decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecimalPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Unsigned decimal degrees from sexagesimal components
pub fn to_decimal(degree: u8, minute: u8, second: u8) -> f64 {
    f64::from(degree) + f64::from(minute) / 60.0 + f64::from(second) / 3600.0
}

/// Signed latitude; negative unless `north`
pub fn latitude(degree: u8, minute: u8, second: u8, north: bool) -> f64 {
    let value = to_decimal(degree, minute, second);
    if north {
        value
    } else {
        -value
    }
}

/// Signed longitude; negative when `west`
pub fn longitude(degree: u8, minute: u8, second: u8, west: bool) -> f64 {
    let value = to_decimal(degree, minute, second);
    if west {
        -value
    } else {
        value
    }
}

/// Decimal position of a GPS record
///
/// # Examples
///
/// ```
/// use equine_telemetry::calc::gps::decimal_position;
/// use equine_telemetry::protocol::types::GpsRecord;
///
/// let fix = GpsRecord {
///     lat_deg: 10, lat_min: 30, lat_sec: 0, lat_north: true,
///     lon_deg: 1, lon_min: 15, lon_sec: 0, lon_west: true,
///     valid_fix: true,
/// };
/// let pos = decimal_position(&fix);
/// assert!((pos.latitude - 10.5).abs() < 1e-12);
/// assert!((pos.longitude + 1.25).abs() < 1e-12);
/// ```
pub fn decimal_position(record: &GpsRecord) -> DecimalPosition {
    DecimalPosition {
        latitude: latitude(record.lat_deg, record.lat_min, record.lat_sec, record.lat_north),
        longitude: longitude(record.lon_deg, record.lon_min, record.lon_sec, record.lon_west),
    }
}
