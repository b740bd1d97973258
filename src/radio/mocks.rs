//! In-memory radio for exercising the gateway without hardware

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{DeliveryStatus, RadioTransport, ReceivedFrame};
use crate::error::RadioError;
use crate::protocol::types::NodeAddress;

/// Mock radio with shared, inspectable state
#[derive(Clone, Default)]
pub struct MockRadio {
    pub incoming: Arc<Mutex<VecDeque<ReceivedFrame>>>,
    pub sent: Arc<Mutex<Vec<(NodeAddress, Vec<u8>)>>>,
    pub known_nodes: Arc<Mutex<Vec<NodeAddress>>>,
    pub receive_error: Arc<Mutex<Option<std::io::ErrorKind>>>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for `receive`
    pub fn push_frame(&self, source: NodeAddress, data: Vec<u8>) {
        self.incoming
            .lock()
            .unwrap()
            .push_back(ReceivedFrame { source, data });
    }

    pub fn sent(&self) -> Vec<(NodeAddress, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn add_node(&self, node: NodeAddress) {
        self.known_nodes.lock().unwrap().push(node);
    }

    pub fn set_receive_error(&self, error: std::io::ErrorKind) {
        *self.receive_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl RadioTransport for MockRadio {
    async fn send(&mut self, dest: &NodeAddress, frame: &[u8]) -> Result<DeliveryStatus, RadioError> {
        self.sent.lock().unwrap().push((dest.clone(), frame.to_vec()));
        Ok(DeliveryStatus::Delivered)
    }

    async fn receive(&mut self, _timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError> {
        if let Some(kind) = self.receive_error.lock().unwrap().take() {
            return Err(RadioError::Io(std::io::Error::new(kind, "Mock receive error")));
        }
        Ok(self.incoming.lock().unwrap().pop_front())
    }

    fn resolve_address(&self, identifier: &str) -> Option<NodeAddress> {
        self.known_nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.identifier.as_deref() == Some(identifier))
            .cloned()
    }

    async fn bytes_available(&mut self) -> Result<usize, RadioError> {
        Ok(self.incoming.lock().unwrap().iter().map(|f| f.data.len()).sum())
    }
}
