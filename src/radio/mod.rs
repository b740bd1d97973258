//! # Radio Transport Module
//!
//! Boundary between the message protocol and the mesh radio.
//!
//! This module handles:
//! - The [`RadioTransport`] trait the gateway loop is written against
//! - Sending a complete envelope as a sequence of MTU-bounded fragments
//! - Tracking node addresses seen on the network
//! - A serial driver for radios running in API-frame mode
//! - Decoding the radio's network association status

pub mod api_frame;
pub mod directory;
pub mod port_trait;
pub mod serial;
pub mod status;

#[cfg(test)]
pub mod mocks;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RadioError, TelemetryError};
use crate::protocol::encoder::encode_envelope;
use crate::protocol::fragment::split;
use crate::protocol::types::{MessageEnvelope, NodeAddress};

/// One frame delivered by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Sender of the frame
    pub source: NodeAddress,

    /// RF payload (fragment header plus fragment payload)
    pub data: Vec<u8>,
}

/// Outcome of a unicast transmission as reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Radio confirmed delivery to the destination
    Delivered,

    /// Frame was written but the radio sent no status in time
    Unconfirmed,

    /// Radio reported a delivery failure code
    Failed(u8),
}

/// Mesh radio link as seen by the gateway
///
/// Reliability is not part of this contract: a failed or unconfirmed send is
/// reported, never retried.
#[async_trait]
pub trait RadioTransport: Send {
    /// Send one frame (at most one MTU) to a node
    async fn send(&mut self, dest: &NodeAddress, frame: &[u8]) -> Result<DeliveryStatus, RadioError>;

    /// Wait up to `timeout` for the next frame; `None` on timeout
    async fn receive(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError>;

    /// Look up a node by its identifier
    fn resolve_address(&self, identifier: &str) -> Option<NodeAddress>;

    /// Number of received bytes waiting to be consumed
    async fn bytes_available(&mut self) -> Result<usize, RadioError>;
}

/// Encode, fragment and send an envelope to `dest`
///
/// Fragments are sent in order. Sending stops at the first transport error;
/// delivery statuses are returned per fragment.
///
/// # Errors
///
/// Returns error if the envelope cannot be encoded, does not fit in 255
/// fragments, or the transport fails.
pub async fn send_envelope<T: RadioTransport + ?Sized>(
    transport: &mut T,
    dest: &NodeAddress,
    envelope: &MessageEnvelope,
    mtu: usize,
) -> Result<Vec<DeliveryStatus>, TelemetryError> {
    let encoded = encode_envelope(envelope)?;
    let fragments = split(envelope.tag(), &encoded, mtu)?;

    let mut statuses = Vec::with_capacity(fragments.len());
    for fragment in &fragments {
        let status = transport.send(dest, &fragment.to_bytes()).await?;
        debug!(
            "Sent {} part {}/{} to {}: {:?}",
            fragment.tag(),
            fragment.part_index(),
            fragment.part_count(),
            dest,
            status
        );
        statuses.push(status);
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::mocks::MockRadio;
    use super::*;
    use crate::protocol::fragment::{Fragment, Reassembler, SeedPolicy};
    use crate::protocol::types::*;

    #[tokio::test]
    async fn test_send_envelope_fragments_in_order() {
        let mut radio = MockRadio::new();
        let dest = NodeAddress::new(0x0013_A200_0000_0002, 0x0001);
        let envelope = MessageEnvelope::new(
            10,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 9,
                sample_interval_ms: 100,
                records: SensorRecords::Accelerometer(vec![
                    AccelerometerRecord { x: 1, y: 2, z: 3 };
                    40
                ]),
            }),
        );

        let statuses = send_envelope(&mut radio, &dest, &envelope, 84).await.unwrap();
        let sent = radio.sent();

        // 1 + 12 + 240 = 253 bytes -> 253 / 80 + 1 = 4 parts
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| *s == DeliveryStatus::Delivered));
        assert!(sent.iter().all(|(to, frame)| to == &dest && frame.len() <= 84));

        let mut reassembler = Reassembler::new(SeedPolicy::FirstPart);
        let mut complete = None;
        for (_, frame) in sent {
            complete = reassembler.accept(dest.addr64, Fragment::parse(&frame).unwrap()).unwrap();
        }
        assert_eq!(complete, Some(encode_envelope(&envelope).unwrap()));
    }

    #[tokio::test]
    async fn test_send_envelope_to_resolved_node() {
        let mut radio = MockRadio::new();
        radio.add_node(NodeAddress::with_identifier(0x0013_A200_0000_0007, 0x2A, "mare-07"));

        assert!(radio.resolve_address("stallion-01").is_none());
        let dest = radio.resolve_address("mare-07").unwrap();
        assert_eq!(dest.addr64, 0x0013_A200_0000_0007);

        let envelope = MessageEnvelope::new(
            3,
            Payload::Debug(DebugRecord {
                timestamp_rel: 2,
                message: "ping".to_string(),
            }),
        );
        let statuses = send_envelope(&mut radio, &dest, &envelope, 84).await.unwrap();

        assert_eq!(statuses, vec![DeliveryStatus::Delivered]);
        assert_eq!(radio.sent()[0].0, dest);
    }

    #[tokio::test]
    async fn test_send_envelope_rejects_invalid_envelope() {
        let mut radio = MockRadio::new();
        let envelope = MessageEnvelope::new(1, Payload::Unrecognized(5));

        let result = send_envelope(&mut radio, &NodeAddress::new(1, 1), &envelope, 84).await;
        assert!(matches!(result, Err(TelemetryError::Encode(_))));
        assert!(radio.sent().is_empty());
    }
}
