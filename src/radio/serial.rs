//! # Serial Radio
//!
//! Drives a mesh radio module in API-frame mode over a serial port.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Applying the gateway's radio settings with AT commands
//! - Sending transmit requests and matching their delivery status
//! - Queueing received packets and learning node addresses
//! - Polling the network association status

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::api_frame::{encode_frame, ApiFrame, FrameDecoder};
use super::directory::NodeDirectory;
use super::port_trait::{SerialPortIO, TokioSerialPort};
use super::status::AssociationStatus;
use super::{DeliveryStatus, RadioTransport, ReceivedFrame};
use crate::config::{Config, RadioConfig, RadioRole};
use crate::error::{RadioError, TelemetryError};
use crate::protocol::fragment::DEFAULT_MTU;
use crate::protocol::types::NodeAddress;

/// Interval between association status polls while waiting to join
const JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read chunk size for the serial port
const READ_CHUNK: usize = 256;

/// Delivery status code meaning success
const DELIVERY_SUCCESS: u8 = 0x00;

/// Runtime settings of a [`SerialRadio`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioOptions {
    /// Largest RF payload handed to the radio
    pub mtu: usize,

    /// How long to wait for AT responses and transmit status
    pub response_timeout: Duration,

    /// Broadcast radius for unicast transmissions (0 = radio default)
    pub max_unicast_hops: u8,

    /// Node directory size
    pub node_cache_capacity: usize,
}

impl Default for RadioOptions {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            response_timeout: Duration::from_millis(750),
            max_unicast_hops: 0,
            node_cache_capacity: super::directory::DEFAULT_CAPACITY,
        }
    }
}

impl From<&Config> for RadioOptions {
    fn from(config: &Config) -> Self {
        Self {
            mtu: config.radio.mtu,
            response_timeout: config.radio.timeout(),
            max_unicast_hops: config.radio.max_unicast_hops,
            node_cache_capacity: config.gateway.node_cache_capacity,
        }
    }
}

/// Radio module attached to a serial port
pub struct SerialRadio<P: SerialPortIO> {
    port: P,
    device_path: String,
    options: RadioOptions,
    decoder: FrameDecoder,
    received: VecDeque<ReceivedFrame>,
    directory: NodeDirectory,
    next_frame_id: u8,
    last_modem_status: Option<u8>,
}

impl<P: SerialPortIO> std::fmt::Debug for SerialRadio<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRadio")
            .field("device_path", &self.device_path)
            .field("options", &self.options)
            .field("queued", &self.received.len())
            .finish_non_exhaustive()
    }
}

impl SerialRadio<TokioSerialPort> {
    /// Open the radio's serial port
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Serial speed the radio is configured for
    /// * `options` - Runtime settings
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use equine_telemetry::radio::serial::{RadioOptions, SerialRadio};
    ///
    /// let radio = SerialRadio::open("/dev/ttyUSB0", 9600, RadioOptions::default())?;
    /// println!("Connected to: {}", radio.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32, options: RadioOptions) -> Result<Self, RadioError> {
        debug!("Opening radio serial port {} at {} baud", path, baud_rate);

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| RadioError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        info!("Opened radio at {}", path);
        Ok(Self::new(TokioSerialPort::new(port), path, options))
    }
}

impl<P: SerialPortIO> SerialRadio<P> {
    /// Wrap an already open port
    pub fn new(port: P, device_path: impl Into<String>, options: RadioOptions) -> Self {
        Self {
            port,
            device_path: device_path.into(),
            options,
            decoder: FrameDecoder::new(),
            received: VecDeque::new(),
            directory: NodeDirectory::new(options.node_cache_capacity),
            next_frame_id: 0,
            last_modem_status: None,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.directory
    }

    /// Last modem status code reported by the radio
    pub fn last_modem_status(&self) -> Option<u8> {
        self.last_modem_status
    }

    /// Apply identifier, PAN ID, role and hop limit, then commit them
    ///
    /// # Errors
    ///
    /// Returns error if the PAN ID is invalid or the radio rejects or
    /// ignores a command
    pub async fn configure(&mut self, radio: &RadioConfig) -> Result<(), TelemetryError> {
        let pan_id = radio.pan_id_bytes()?;

        self.at_command(*b"NI", radio.identifier.as_bytes()).await?;
        self.at_command(*b"ID", &pan_id).await?;

        let coordinator = match radio.role {
            RadioRole::Coordinator => 1,
            RadioRole::EndDevice => 0,
        };
        self.at_command(*b"CE", &[coordinator]).await?;

        if radio.max_unicast_hops > 0 {
            self.at_command(*b"NH", &[radio.max_unicast_hops]).await?;
        }

        self.at_command(*b"AC", &[]).await?;
        info!(
            "Radio configured as {:?} '{}' (PAN {:02X?})",
            radio.role, radio.identifier, pan_id
        );
        Ok(())
    }

    /// Send an AT command and wait for its response
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, RadioError>` - Response data on status OK
    ///
    /// # Errors
    ///
    /// Returns error if the write fails, the radio answers with a non-zero
    /// status, or no response arrives within the response timeout
    pub async fn at_command(&mut self, command: [u8; 2], parameter: &[u8]) -> Result<Vec<u8>, RadioError> {
        let frame_id = self.allocate_frame_id();
        let name = String::from_utf8_lossy(&command).into_owned();

        self.write_frame(&ApiFrame::AtCommand {
            frame_id,
            command,
            parameter: parameter.to_vec(),
        })
        .await?;

        let timeout = self.options.response_timeout;
        let response = self
            .wait_for(timeout, |frame| {
                matches!(frame, ApiFrame::AtResponse { frame_id: id, .. } if *id == frame_id)
            })
            .await?;

        match response {
            Some(ApiFrame::AtResponse { status: 0, data, .. }) => {
                debug!("AT {} ok ({} bytes)", name, data.len());
                Ok(data)
            }
            Some(ApiFrame::AtResponse { status, .. }) => Err(RadioError::Frame(format!(
                "AT {} failed with status {}",
                name, status
            ))),
            _ => Err(RadioError::NoResponse(format!("AT {}", name))),
        }
    }

    /// Query the network association indication
    ///
    /// # Errors
    ///
    /// Returns error if the `AI` command fails or returns no data
    pub async fn association_status(&mut self) -> Result<AssociationStatus, RadioError> {
        let data = self.at_command(*b"AI", &[]).await?;
        data.first()
            .map(|&code| AssociationStatus::from(code))
            .ok_or_else(|| RadioError::Frame("AI response carried no status".to_string()))
    }

    /// Poll the association status until joined or `timeout` elapses
    ///
    /// Returns the last status seen; the caller decides whether a
    /// status other than joined is fatal.
    ///
    /// # Errors
    ///
    /// Returns error if the radio stops answering the status query
    pub async fn wait_for_join(&mut self, timeout: Duration) -> Result<AssociationStatus, RadioError> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.association_status().await?;
            if status.is_joined() {
                info!("Radio joined the network");
                return Ok(status);
            }

            if Instant::now() + JOIN_POLL_INTERVAL > deadline {
                warn!("Radio has not joined: {}", status);
                return Ok(status);
            }

            info!("Waiting for network: {}", status);
            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }
    }

    fn allocate_frame_id(&mut self) -> u8 {
        // Frame id 0 suppresses the radio's response
        self.next_frame_id = self.next_frame_id.checked_add(1).unwrap_or(1);
        self.next_frame_id
    }

    async fn write_frame(&mut self, frame: &ApiFrame) -> Result<(), RadioError> {
        let bytes = encode_frame(frame);
        self.port.write_all(&bytes).await?;
        self.port.flush().await?;
        Ok(())
    }

    /// Read the next well-formed frame before `deadline`
    async fn read_frame(&mut self, deadline: Instant) -> Result<Option<ApiFrame>, RadioError> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(result) = self.decoder.next_frame() {
                match result {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => warn!("Dropping serial frame: {}", e),
                }
            }

            match tokio::time::timeout_at(deadline, self.port.read(&mut chunk)).await {
                Ok(Ok(count)) => self.decoder.push(&chunk[..count]),
                Ok(Err(e)) => return Err(RadioError::Io(e)),
                Err(_) => return Ok(None),
            }
        }
    }

    /// Handle frames nobody is waiting for; hand back the rest
    fn dispatch(&mut self, frame: ApiFrame) -> Option<ApiFrame> {
        match frame {
            ApiFrame::ReceivePacket {
                src64, src16, data, ..
            } => {
                let source = self.directory.observe(&NodeAddress::new(src64, src16));
                debug!("Received {} bytes from {}", data.len(), source);
                self.received.push_back(ReceivedFrame { source, data });
                None
            }
            ApiFrame::NodeIdentification {
                addr64,
                addr16,
                identifier,
            } => {
                let node = NodeAddress::with_identifier(addr64, addr16, identifier);
                info!("Node announced: {}", node);
                self.directory.observe(&node);
                None
            }
            ApiFrame::ModemStatus(status) => {
                info!("Modem status 0x{:02X}", status);
                self.last_modem_status = Some(status);
                None
            }
            other => Some(other),
        }
    }

    async fn wait_for<F>(&mut self, timeout: Duration, wanted: F) -> Result<Option<ApiFrame>, RadioError>
    where
        F: Fn(&ApiFrame) -> bool + Send,
    {
        let deadline = Instant::now() + timeout;

        loop {
            let Some(frame) = self.read_frame(deadline).await? else {
                return Ok(None);
            };
            if let Some(frame) = self.dispatch(frame) {
                if wanted(&frame) {
                    return Ok(Some(frame));
                }
                debug!("Ignoring unexpected frame {:?}", frame);
            }
        }
    }
}

#[async_trait]
impl<P: SerialPortIO> RadioTransport for SerialRadio<P> {
    async fn send(&mut self, dest: &NodeAddress, frame: &[u8]) -> Result<DeliveryStatus, RadioError> {
        if frame.len() > self.options.mtu {
            return Err(RadioError::FrameTooLarge {
                len: frame.len(),
                mtu: self.options.mtu,
            });
        }

        let frame_id = self.allocate_frame_id();
        let dest16 = self
            .directory
            .get(dest.addr64)
            .map(|node| node.addr16)
            .unwrap_or(dest.addr16);

        self.write_frame(&ApiFrame::TransmitRequest {
            frame_id,
            dest64: dest.addr64,
            dest16,
            radius: self.options.max_unicast_hops,
            options: 0,
            data: frame.to_vec(),
        })
        .await?;

        let timeout = self.options.response_timeout;
        let status = self
            .wait_for(timeout, |f| {
                matches!(f, ApiFrame::TransmitStatus { frame_id: id, .. } if *id == frame_id)
            })
            .await?;

        Ok(match status {
            Some(ApiFrame::TransmitStatus { delivery, .. }) if delivery == DELIVERY_SUCCESS => {
                DeliveryStatus::Delivered
            }
            Some(ApiFrame::TransmitStatus { delivery, .. }) => {
                warn!("Delivery to {} failed: status 0x{:02X}", dest, delivery);
                DeliveryStatus::Failed(delivery)
            }
            _ => DeliveryStatus::Unconfirmed,
        })
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<ReceivedFrame>, RadioError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = self.received.pop_front() {
                return Ok(Some(frame));
            }

            let Some(frame) = self.read_frame(deadline).await? else {
                return Ok(None);
            };
            if let Some(frame) = self.dispatch(frame) {
                debug!("Ignoring unsolicited frame {:?}", frame);
            }
        }
    }

    fn resolve_address(&self, identifier: &str) -> Option<NodeAddress> {
        self.directory.resolve(identifier).cloned()
    }

    async fn bytes_available(&mut self) -> Result<usize, RadioError> {
        let queued: usize = self.received.iter().map(|f| f.data.len()).sum();
        Ok(queued + self.decoder.buffered() + self.port.bytes_to_read()?)
    }
}
