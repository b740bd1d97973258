//! # Fragment Engine
//!
//! Splits an encoded envelope into radio frames no larger than the MTU and
//! stitches received frames back together.
//!
//! ## Frame layout
//!
//! ```text
//! [envelope tag][part (1-based)][part count][payload len][payload ...]
//! ```
//!
//! ## Part count
//!
//! `part_count = len / C + 1` with `C = MTU - 4`. When `len` is an exact
//! multiple of `C` this yields a trailing fragment with an empty body. Deployed
//! nodes emit exactly this sequence, so it is reproduced here and the empty
//! trailing part is accepted on reassembly.
//!
//! ## Reassembly
//!
//! Each session (source node + envelope tag) accepts parts strictly in order.
//! Any other part drops the whole session; nothing is buffered for later
//! reordering.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use super::types::EnvelopeTag;
use crate::error::FragmentError;

/// Fragment header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Default radio MTU (maximum RF payload of the deployed radios)
pub const DEFAULT_MTU: usize = 84;

/// Largest MTU whose payload length still fits the one-byte header field
pub const MAX_MTU: usize = HEADER_SIZE + u8::MAX as usize;

/// Maximum parts per message (one-byte part counter)
pub const MAX_PARTS: usize = u8::MAX as usize;

/// One MTU-bounded slice of an encoded envelope
///
/// Built only by [`split`] and [`Fragment::parse`], so the payload never
/// exceeds what the one-byte length field can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    tag: EnvelopeTag,
    part_index: u8,
    part_count: u8,
    payload: Vec<u8>,
}

impl Fragment {
    /// Tag of the envelope this fragment belongs to
    pub fn tag(&self) -> EnvelopeTag {
        self.tag
    }

    /// 1-based index of this part
    pub fn part_index(&self) -> u8 {
        self.part_index
    }

    /// Total number of parts in the message
    pub fn part_count(&self) -> u8 {
        self.part_count
    }

    /// Payload bytes carried by this part
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Declared payload length
    pub fn payload_len(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Serialize header and payload into a radio frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        frame.push(self.tag.to_byte());
        frame.push(self.part_index);
        frame.push(self.part_count);
        frame.push(self.payload_len());
        frame.extend_from_slice(&self.payload);
        frame
    }

    /// Parse a received radio frame
    ///
    /// The payload copy is bounded by the declared payload length; any bytes
    /// the radio delivered beyond it are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Frame is shorter than the 4-byte header
    /// - Part index is 0 or larger than the part count
    /// - Declared payload length exceeds the received bytes
    pub fn parse(frame: &[u8]) -> Result<Self, FragmentError> {
        if frame.len() < HEADER_SIZE {
            return Err(FragmentError::FrameTooShort(frame.len()));
        }

        let tag = EnvelopeTag::from(frame[0]);
        let part_index = frame[1];
        let part_count = frame[2];
        let payload_len = frame[3] as usize;

        if part_index == 0 || part_count == 0 || part_index > part_count {
            return Err(FragmentError::InvalidHeader(format!(
                "part {} of {}",
                part_index, part_count
            )));
        }

        let available = frame.len() - HEADER_SIZE;
        if payload_len > available {
            return Err(FragmentError::PayloadOverrun {
                declared: payload_len,
                available,
            });
        }

        Ok(Self {
            tag,
            part_index,
            part_count,
            payload: frame[HEADER_SIZE..HEADER_SIZE + payload_len].to_vec(),
        })
    }
}

/// Maximum payload bytes per fragment for an MTU
///
/// # Errors
///
/// Returns error if the MTU leaves no payload room or exceeds [`MAX_MTU`]
pub fn max_fragment_payload(mtu: usize) -> Result<usize, FragmentError> {
    if mtu <= HEADER_SIZE || mtu > MAX_MTU {
        return Err(FragmentError::InvalidMtu(mtu));
    }
    Ok(mtu - HEADER_SIZE)
}

/// Number of parts a buffer of `len` bytes is split into
pub fn part_count(len: usize, chunk: usize) -> usize {
    len / chunk + 1
}

/// Split an encoded envelope into fragments
///
/// # Arguments
///
/// * `tag` - Envelope tag, copied into every fragment header
/// * `payload` - Encoded envelope bytes
/// * `mtu` - Maximum radio frame size, header included
///
/// # Errors
///
/// Returns error if the MTU is invalid or the payload needs more than 255 parts
///
/// # Examples
///
/// ```
/// use equine_telemetry::protocol::fragment::split;
/// use equine_telemetry::protocol::types::EnvelopeTag;
///
/// let frames = split(EnvelopeTag::SensorData, &[0u8; 100], 84).unwrap();
/// assert_eq!(frames.len(), 2);
/// assert_eq!(frames[0].payload().len(), 80);
/// assert_eq!(frames[1].payload().len(), 20);
/// ```
pub fn split(tag: EnvelopeTag, payload: &[u8], mtu: usize) -> Result<Vec<Fragment>, FragmentError> {
    let chunk = max_fragment_payload(mtu)?;
    let count = part_count(payload.len(), chunk);
    if count > MAX_PARTS {
        return Err(FragmentError::TooManyParts {
            len: payload.len(),
            parts: count,
        });
    }

    let fragments = (0..count)
        .map(|i| {
            let start = (i * chunk).min(payload.len());
            let end = ((i + 1) * chunk).min(payload.len());
            Fragment {
                tag,
                part_index: (i + 1) as u8,
                part_count: count as u8,
                payload: payload[start..end].to_vec(),
            }
        })
        .collect();

    Ok(fragments)
}

/// How a session may be started when no buffer exists for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Only part 1 opens a session
    #[default]
    FirstPart,

    /// Whichever part arrives first opens the session, later parts must follow it
    AnyPart,
}

/// Receiver-side accumulator for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyBuffer {
    data: Vec<u8>,
    expected_next_part: u8,
    part_count: u8,
    complete: bool,
}

impl ReassemblyBuffer {
    fn seed(fragment: &Fragment) -> Self {
        let mut buffer = Self {
            data: Vec::with_capacity(fragment.payload.len() * fragment.part_count as usize),
            expected_next_part: fragment.part_index,
            part_count: fragment.part_count,
            complete: false,
        };
        buffer.append(fragment);
        buffer
    }

    fn append(&mut self, fragment: &Fragment) {
        self.data.extend_from_slice(&fragment.payload);
        self.complete = fragment.part_index == self.part_count;
        self.expected_next_part = fragment.part_index.saturating_add(1);
    }

    fn accepts(&self, fragment: &Fragment) -> bool {
        fragment.part_index == self.expected_next_part && fragment.part_count == self.part_count
    }

    /// Payload bytes accumulated so far
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Next part this buffer will accept
    pub fn expected_next_part(&self) -> u8 {
        self.expected_next_part
    }

    pub fn part_count(&self) -> u8 {
        self.part_count
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Session key: source hardware address and envelope tag
pub type SessionKey = (u64, EnvelopeTag);

/// Reassembles fragments from many nodes
///
/// # Examples
///
/// ```
/// use equine_telemetry::protocol::fragment::{split, Reassembler, SeedPolicy};
/// use equine_telemetry::protocol::types::EnvelopeTag;
///
/// let message = vec![7u8; 200];
/// let mut reassembler = Reassembler::new(SeedPolicy::FirstPart);
/// let mut complete = None;
/// for fragment in split(EnvelopeTag::Debug, &message, 84).unwrap() {
///     complete = reassembler.accept(0x0013_A200, fragment).unwrap();
/// }
/// assert_eq!(complete, Some(message));
/// ```
#[derive(Debug, Default)]
pub struct Reassembler {
    policy: SeedPolicy,
    sessions: HashMap<SessionKey, ReassemblyBuffer>,
}

impl Reassembler {
    pub fn new(policy: SeedPolicy) -> Self {
        Self {
            policy,
            sessions: HashMap::new(),
        }
    }

    /// Feed one fragment from `source`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Fragment completed the message; the session is gone
    /// * `Ok(None)` - Fragment accepted, more parts expected
    ///
    /// # Errors
    ///
    /// Returns error (and discards the fragment) if it is out of sequence, in
    /// which case any in-progress session for the same key is dropped as well,
    /// or if it may not open a session under the seed policy.
    pub fn accept(
        &mut self,
        source: u64,
        fragment: Fragment,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        let key = (source, fragment.tag);

        let buffer = match self.sessions.remove(&key) {
            Some(mut buffer) => {
                if !buffer.accepts(&fragment) {
                    warn!(
                        "Dropping {} session from {:016X}: expected part {}/{}, got {}/{}",
                        fragment.tag,
                        source,
                        buffer.expected_next_part,
                        buffer.part_count,
                        fragment.part_index,
                        fragment.part_count
                    );
                    return Err(FragmentError::OutOfSequence {
                        expected: buffer.expected_next_part,
                        received: fragment.part_index,
                        count: buffer.part_count,
                    });
                }
                buffer.append(&fragment);
                buffer
            }
            None => {
                if self.policy == SeedPolicy::FirstPart && fragment.part_index != 1 {
                    return Err(FragmentError::NotSeed {
                        received: fragment.part_index,
                        count: fragment.part_count,
                    });
                }
                ReassemblyBuffer::seed(&fragment)
            }
        };

        if buffer.is_complete() {
            debug!(
                "Reassembled {} message from {:016X} ({} bytes, {} parts)",
                fragment.tag,
                source,
                buffer.data.len(),
                buffer.part_count
            );
            return Ok(Some(buffer.data));
        }

        self.sessions.insert(key, buffer);
        Ok(None)
    }

    /// In-progress buffer for a session, if any
    pub fn session(&self, source: u64, tag: EnvelopeTag) -> Option<&ReassemblyBuffer> {
        self.sessions.get(&(source, tag))
    }

    /// Number of sessions still waiting for parts
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every in-progress session, returning how many were discarded
    pub fn discard_all(&mut self) -> usize {
        let dropped = self.sessions.len();
        self.sessions.clear();
        dropped
    }
}
