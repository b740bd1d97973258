//! # API Frame Codec
//!
//! Framing used on the serial line between the host and a radio module in
//! API mode (unescaped).
//!
//! ```text
//! [0x7E][length: u16 BE][frame data: length bytes][checksum]
//! ```
//!
//! `frame data` starts with the frame type byte. The checksum is
//! `0xFF - (sum of frame data bytes & 0xFF)`, so summing frame data and
//! checksum gives `0xFF` for a valid frame. Multi-byte addresses are big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::RadioError;

/// Start delimiter of every API frame
pub const START_DELIMITER: u8 = 0x7E;

/// AT command request
pub const FRAME_AT_COMMAND: u8 = 0x08;
/// Transmit request
pub const FRAME_TRANSMIT_REQUEST: u8 = 0x10;
/// AT command response
pub const FRAME_AT_RESPONSE: u8 = 0x88;
/// Modem status
pub const FRAME_MODEM_STATUS: u8 = 0x8A;
/// Transmit status
pub const FRAME_TRANSMIT_STATUS: u8 = 0x8B;
/// Receive packet
pub const FRAME_RECEIVE_PACKET: u8 = 0x90;
/// Node identification indicator
pub const FRAME_NODE_IDENTIFICATION: u8 = 0x95;

/// Largest frame data length accepted before assuming corruption
pub const MAX_FRAME_DATA: usize = 512;

/// 16-bit address meaning "unknown, use the 64-bit address"
pub const ADDR16_UNKNOWN: u16 = 0xFFFE;

/// Parsed API frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFrame {
    AtCommand {
        frame_id: u8,
        command: [u8; 2],
        parameter: Vec<u8>,
    },
    AtResponse {
        frame_id: u8,
        command: [u8; 2],
        status: u8,
        data: Vec<u8>,
    },
    TransmitRequest {
        frame_id: u8,
        dest64: u64,
        dest16: u16,
        radius: u8,
        options: u8,
        data: Vec<u8>,
    },
    TransmitStatus {
        frame_id: u8,
        dest16: u16,
        retries: u8,
        delivery: u8,
        discovery: u8,
    },
    ReceivePacket {
        src64: u64,
        src16: u16,
        options: u8,
        data: Vec<u8>,
    },
    ModemStatus(u8),
    NodeIdentification {
        addr64: u64,
        addr16: u16,
        identifier: String,
    },
    /// Frame type this gateway does not interpret
    Other { frame_type: u8, data: Vec<u8> },
}

/// API frame checksum over frame data
///
/// # Examples
///
/// ```
/// use equine_telemetry::radio::api_frame::checksum;
///
/// // AT command "AI" with frame id 1
/// assert_eq!(checksum(&[0x08, 0x01, b'A', b'I']), 0x6C);
/// ```
pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum = frame_data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0xFF - sum
}

/// Encode a frame including delimiter, length and checksum
pub fn encode_frame(frame: &ApiFrame) -> Vec<u8> {
    let mut data = BytesMut::new();

    match frame {
        ApiFrame::AtCommand {
            frame_id,
            command,
            parameter,
        } => {
            data.put_u8(FRAME_AT_COMMAND);
            data.put_u8(*frame_id);
            data.put_slice(command);
            data.put_slice(parameter);
        }
        ApiFrame::AtResponse {
            frame_id,
            command,
            status,
            data: value,
        } => {
            data.put_u8(FRAME_AT_RESPONSE);
            data.put_u8(*frame_id);
            data.put_slice(command);
            data.put_u8(*status);
            data.put_slice(value);
        }
        ApiFrame::TransmitRequest {
            frame_id,
            dest64,
            dest16,
            radius,
            options,
            data: payload,
        } => {
            data.put_u8(FRAME_TRANSMIT_REQUEST);
            data.put_u8(*frame_id);
            data.put_u64(*dest64);
            data.put_u16(*dest16);
            data.put_u8(*radius);
            data.put_u8(*options);
            data.put_slice(payload);
        }
        ApiFrame::TransmitStatus {
            frame_id,
            dest16,
            retries,
            delivery,
            discovery,
        } => {
            data.put_u8(FRAME_TRANSMIT_STATUS);
            data.put_u8(*frame_id);
            data.put_u16(*dest16);
            data.put_u8(*retries);
            data.put_u8(*delivery);
            data.put_u8(*discovery);
        }
        ApiFrame::ReceivePacket {
            src64,
            src16,
            options,
            data: payload,
        } => {
            data.put_u8(FRAME_RECEIVE_PACKET);
            data.put_u64(*src64);
            data.put_u16(*src16);
            data.put_u8(*options);
            data.put_slice(payload);
        }
        ApiFrame::ModemStatus(status) => {
            data.put_u8(FRAME_MODEM_STATUS);
            data.put_u8(*status);
        }
        ApiFrame::NodeIdentification {
            addr64,
            addr16,
            identifier,
        } => {
            data.put_u8(FRAME_NODE_IDENTIFICATION);
            data.put_u64(*addr64);
            data.put_u16(*addr16);
            data.put_u8(0x02); // options: broadcast
            data.put_u16(*addr16);
            data.put_u64(*addr64);
            data.put_slice(identifier.as_bytes());
            data.put_u8(0x00);
            data.put_u16(ADDR16_UNKNOWN); // parent
            data.put_u8(0x02); // end device
            data.put_u8(0x01); // source event: pushbutton
            data.put_u16(0xC105);
            data.put_u16(0x101E);
        }
        ApiFrame::Other {
            frame_type,
            data: payload,
        } => {
            data.put_u8(*frame_type);
            data.put_slice(payload);
        }
    }

    let mut frame_bytes = Vec::with_capacity(data.len() + 4);
    frame_bytes.push(START_DELIMITER);
    frame_bytes.put_u16(data.len() as u16);
    frame_bytes.extend_from_slice(&data);
    frame_bytes.push(checksum(&data));
    frame_bytes
}

/// Parse frame data (type byte first, no delimiter, length or checksum)
///
/// # Errors
///
/// Returns error if the frame is shorter than its type requires
pub fn parse_frame_data(frame_data: &[u8]) -> Result<ApiFrame, RadioError> {
    let mut cursor = frame_data;
    if !cursor.has_remaining() {
        return Err(RadioError::Frame("empty frame data".to_string()));
    }

    let frame_type = cursor.get_u8();
    let need = |n: usize, cursor: &[u8]| -> Result<(), RadioError> {
        if cursor.remaining() < n {
            Err(RadioError::Frame(format!(
                "frame type 0x{:02X} too short: {} bytes",
                frame_type,
                frame_data.len()
            )))
        } else {
            Ok(())
        }
    };

    let frame = match frame_type {
        FRAME_AT_COMMAND => {
            need(3, cursor)?;
            let frame_id = cursor.get_u8();
            let command = [cursor.get_u8(), cursor.get_u8()];
            ApiFrame::AtCommand {
                frame_id,
                command,
                parameter: cursor.to_vec(),
            }
        }
        FRAME_AT_RESPONSE => {
            need(4, cursor)?;
            let frame_id = cursor.get_u8();
            let command = [cursor.get_u8(), cursor.get_u8()];
            let status = cursor.get_u8();
            ApiFrame::AtResponse {
                frame_id,
                command,
                status,
                data: cursor.to_vec(),
            }
        }
        FRAME_TRANSMIT_REQUEST => {
            need(13, cursor)?;
            ApiFrame::TransmitRequest {
                frame_id: cursor.get_u8(),
                dest64: cursor.get_u64(),
                dest16: cursor.get_u16(),
                radius: cursor.get_u8(),
                options: cursor.get_u8(),
                data: cursor.to_vec(),
            }
        }
        FRAME_TRANSMIT_STATUS => {
            need(6, cursor)?;
            ApiFrame::TransmitStatus {
                frame_id: cursor.get_u8(),
                dest16: cursor.get_u16(),
                retries: cursor.get_u8(),
                delivery: cursor.get_u8(),
                discovery: cursor.get_u8(),
            }
        }
        FRAME_RECEIVE_PACKET => {
            need(11, cursor)?;
            ApiFrame::ReceivePacket {
                src64: cursor.get_u64(),
                src16: cursor.get_u16(),
                options: cursor.get_u8(),
                data: cursor.to_vec(),
            }
        }
        FRAME_MODEM_STATUS => {
            need(1, cursor)?;
            ApiFrame::ModemStatus(cursor.get_u8())
        }
        FRAME_NODE_IDENTIFICATION => {
            // sender64, sender16, options, then the remote node's own addresses
            need(21, cursor)?;
            cursor.advance(11);
            let addr16 = cursor.get_u16();
            let addr64 = cursor.get_u64();
            let end = cursor.iter().position(|&b| b == 0).unwrap_or(cursor.len());
            ApiFrame::NodeIdentification {
                addr64,
                addr16,
                identifier: String::from_utf8_lossy(&cursor[..end]).into_owned(),
            }
        }
        other => ApiFrame::Other {
            frame_type: other,
            data: cursor.to_vec(),
        },
    };

    Ok(frame)
}

/// Streaming decoder for bytes read off the serial line
///
/// Bytes before a start delimiter are skipped. A frame with a bad checksum or
/// an implausible length is dropped and the decoder resynchronizes on the
/// next delimiter.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw serial bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, if one is buffered
    ///
    /// Returns `Some(Err(_))` for a dropped frame so the caller can log it;
    /// call again to continue with the remaining bytes.
    pub fn next_frame(&mut self) -> Option<Result<ApiFrame, RadioError>> {
        let start = self.buf.iter().position(|&b| b == START_DELIMITER);
        match start {
            Some(pos) => self.buf.advance(pos),
            None => {
                self.buf.clear();
                return None;
            }
        }

        if self.buf.len() < 3 {
            return None;
        }
        let length = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
        if length == 0 || length > MAX_FRAME_DATA {
            self.buf.advance(1);
            return Some(Err(RadioError::Frame(format!(
                "implausible frame length {}",
                length
            ))));
        }
        if self.buf.len() < 3 + length + 1 {
            return None;
        }

        let frame_data = &self.buf[3..3 + length];
        let expected = checksum(frame_data);
        let received = self.buf[3 + length];
        if expected != received {
            self.buf.advance(1);
            return Some(Err(RadioError::Frame(format!(
                "checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected, received
            ))));
        }

        let parsed = parse_frame_data(frame_data);
        self.buf.advance(3 + length + 1);
        Some(parsed)
    }
}
