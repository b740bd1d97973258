//! # Gateway Loop
//!
//! Single-threaded receive loop tying the radio, the fragment engine, the
//! wire codec and the storage mapper together.
//!
//! Each poll drives one received frame to completion: a message that the
//! frame completes is decoded and written to the store before the next poll
//! starts. Faults in a single frame or message are logged and dropped; only
//! the caller decides when to stop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::calc::timestamp::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{RadioError, StoreError};
use crate::protocol::decoder::decode_envelope;
use crate::protocol::fragment::{Fragment, Reassembler};
use crate::radio::{RadioTransport, ReceivedFrame};
use crate::storage::mapper::{StorageMapper, StoreReport};
use crate::storage::RelationalStore;

/// Result of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to read
    Idle,
    /// Fragment accepted, message not complete yet
    Pending,
    /// Message completed, decoded and written
    Stored(StoreReport),
    /// Frame or message discarded
    Dropped,
}

/// Counters reported at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub frames_received: u64,
    pub messages_stored: u64,
    pub frames_dropped: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
}

/// Telemetry gateway over a radio transport and a relational store
pub struct Gateway<R: RadioTransport, S: RelationalStore> {
    radio: R,
    store: S,
    reassembler: Reassembler,
    mapper: StorageMapper,
    clock: Box<dyn Clock>,
    receive_timeout: Duration,
    poll_interval: Duration,
    stats: GatewayStats,
    closed: bool,
}

impl<R: RadioTransport, S: RelationalStore> Gateway<R, S> {
    /// Create a gateway using the receive timeout, poll interval and seed
    /// policy from `config`
    pub fn new(radio: R, store: S, config: &Config) -> Self {
        Self {
            radio,
            store,
            reassembler: Reassembler::new(config.reassembly.seed_policy),
            mapper: StorageMapper::default(),
            clock: Box::new(SystemClock),
            receive_timeout: config.radio.timeout(),
            poll_interval: config.gateway.poll_interval(),
            stats: GatewayStats::default(),
            closed: false,
        }
    }

    /// Replace the wall clock used for timestamp reconciliation
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the storage mapper, e.g. to apply a sensor's own calibration
    pub fn with_mapper(mut self, mapper: StorageMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    /// Messages still waiting for fragments
    pub fn pending_messages(&self) -> usize {
        self.reassembler.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receive and process at most one frame
    ///
    /// # Errors
    ///
    /// Returns error only if the radio transport fails; message-level faults
    /// are reported as [`PollOutcome::Dropped`].
    pub async fn poll_once(&mut self) -> Result<PollOutcome, RadioError> {
        if self.closed {
            return Ok(PollOutcome::Idle);
        }

        if self.radio.bytes_available().await? == 0 {
            return Ok(PollOutcome::Idle);
        }

        match self.radio.receive(self.receive_timeout).await? {
            Some(frame) => Ok(self.handle_frame(frame)),
            None => Ok(PollOutcome::Idle),
        }
    }

    /// Process one received frame
    pub fn handle_frame(&mut self, frame: ReceivedFrame) -> PollOutcome {
        self.stats.frames_received += 1;
        let source = frame.source;

        let fragment = match Fragment::parse(&frame.data) {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!("Dropping frame from {}: {}", source, e);
                self.stats.frames_dropped += 1;
                return PollOutcome::Dropped;
            }
        };

        let message = match self.reassembler.accept(source.addr64, fragment) {
            Ok(Some(message)) => message,
            Ok(None) => return PollOutcome::Pending,
            Err(e) => {
                warn!("Dropping fragment from {}: {}", source, e);
                self.stats.frames_dropped += 1;
                return PollOutcome::Dropped;
            }
        };

        let decoded = match decode_envelope(&message) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Dropping message from {}: {}", source, e);
                self.stats.frames_dropped += 1;
                return PollOutcome::Dropped;
            }
        };
        if let Some(warning) = &decoded.warning {
            warn!("Message from {}: {}", source, warning);
        }

        let now = self.clock.now();
        let report = self.mapper.store(&mut self.store, &source, &decoded.envelope, now);
        debug!(
            "Stored {} message from {}: {} rows, {} failed",
            decoded.envelope.tag(),
            source,
            report.rows_written,
            report.rows_failed
        );

        self.stats.messages_stored += 1;
        self.stats.rows_written += report.rows_written as u64;
        self.stats.rows_failed += report.rows_failed as u64;
        PollOutcome::Stored(report)
    }

    /// Poll until `shutdown` turns true (or its sender is dropped), then shut down
    ///
    /// Transport errors are logged and polling continues.
    ///
    /// # Errors
    ///
    /// Returns error if closing the store fails
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<GatewayStats, StoreError> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Gateway receive loop started");

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("Radio receive failed: {}", e);
                    }
                }
            }
        }

        self.shutdown()?;
        Ok(self.stats)
    }

    /// Discard in-flight reassembly state and close the store
    ///
    /// Safe to call more than once; the store is closed only the first time.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails to close
    pub fn shutdown(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let dropped = self.reassembler.discard_all();
        if dropped > 0 {
            info!("Discarded {} incomplete messages", dropped);
        }

        info!(
            "Gateway stopped: {} frames, {} messages stored, {} dropped, {} rows written, {} rows failed",
            self.stats.frames_received,
            self.stats.messages_stored,
            self.stats.frames_dropped,
            self.stats.rows_written,
            self.stats.rows_failed
        );
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::thermopile::ThermopileCalibration;
    use crate::calc::timestamp::FixedClock;
    use crate::protocol::encoder::encode_envelope;
    use crate::protocol::fragment::{split, SeedPolicy};
    use crate::protocol::types::*;
    use crate::radio::mocks::MockRadio;
    use crate::storage::{MockRelationalStore, SqlValue, Table};

    fn node(addr64: u64) -> NodeAddress {
        NodeAddress::new(addr64, 0x0001)
    }

    fn heart_envelope(count: usize) -> MessageEnvelope {
        MessageEnvelope::new(
            50,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 40,
                sample_interval_ms: 200,
                records: SensorRecords::HeartRate(vec![HeartRateRecord { bpm: 80 }; count]),
            }),
        )
    }

    fn frames(envelope: &MessageEnvelope, mtu: usize) -> Vec<Vec<u8>> {
        let encoded = encode_envelope(envelope).unwrap();
        split(envelope.tag(), &encoded, mtu)
            .unwrap()
            .iter()
            .map(Fragment::to_bytes)
            .collect()
    }

    fn gateway(
        radio: &MockRadio,
        store: MockRelationalStore,
        policy: SeedPolicy,
    ) -> Gateway<MockRadio, MockRelationalStore> {
        let mut config = Config::default();
        config.radio.timeout_ms = 5;
        config.gateway.poll_interval_us = 100;
        config.reassembly.seed_policy = policy;
        Gateway::new(radio.clone(), store, &config).with_clock(FixedClock(1_000))
    }

    #[tokio::test]
    async fn test_idle_without_bytes() {
        let radio = MockRadio::new();
        let mut gw = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);

        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_single_fragment_message_is_stored() {
        let radio = MockRadio::new();
        for frame in frames(&heart_envelope(2), 84) {
            radio.push_frame(node(7), frame);
        }

        let mut store = MockRelationalStore::new();
        store
            .expect_execute()
            .withf(|s| s.table == Table::SensorHeart && s.values[1] == SqlValue::Integer(990))
            .times(2)
            .returning(|_| Ok(()));
        store
            .expect_execute()
            .withf(|s| s.table == Table::MonitoringNodes && s.values[0] == SqlValue::Unsigned(7))
            .times(1)
            .returning(|_| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        let outcome = gw.poll_once().await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Stored(StoreReport {
                rows_written: 3,
                rows_failed: 0
            })
        );
        assert_eq!(gw.stats().messages_stored, 1);
    }

    #[tokio::test]
    async fn test_temperature_uses_mapper_calibration() {
        let calibration = ThermopileCalibration {
            s0: 7.0e-14,
            ..ThermopileCalibration::default()
        };
        let expected = calibration.object_temperature(1.0e-4, 300.0);
        assert_ne!(expected, ThermopileCalibration::default().object_temperature(1.0e-4, 300.0));

        let radio = MockRadio::new();
        let envelope = MessageEnvelope::new(
            50,
            Payload::SensorData(SensorBatch {
                end_timestamp_rel: 40,
                sample_interval_ms: 200,
                records: SensorRecords::RawTemperature(vec![RawTemperatureRecord {
                    v_obj: 1.0e-4,
                    t_env: 300.0,
                }]),
            }),
        );
        for frame in frames(&envelope, 84) {
            radio.push_frame(node(9), frame);
        }

        let mut store = MockRelationalStore::new();
        store
            .expect_execute()
            .withf(move |s| s.table == Table::SensorTemperature && s.values[3] == SqlValue::Real(expected))
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_execute()
            .withf(|s| s.table == Table::MonitoringNodes)
            .times(1)
            .returning(|_| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart)
            .with_mapper(StorageMapper::new(calibration));
        assert!(matches!(gw.poll_once().await.unwrap(), PollOutcome::Stored(r) if r.is_clean()));
    }

    #[tokio::test]
    async fn test_multi_fragment_message() {
        let radio = MockRadio::new();
        let parts = frames(&heart_envelope(100), 40);
        assert!(parts.len() > 2);
        for frame in &parts {
            radio.push_frame(node(7), frame.clone());
        }

        let mut store = MockRelationalStore::new();
        store.expect_execute().times(101).returning(|_| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        for _ in 0..parts.len() - 1 {
            assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Pending);
        }
        assert_eq!(gw.pending_messages(), 1);
        assert!(matches!(gw.poll_once().await.unwrap(), PollOutcome::Stored(_)));
        assert_eq!(gw.pending_messages(), 0);
    }

    #[tokio::test]
    async fn test_interleaved_sources_reassemble_independently() {
        let radio = MockRadio::new();
        let a = frames(&heart_envelope(100), 60);
        let b = frames(&heart_envelope(100), 60);
        for (fa, fb) in a.iter().zip(&b) {
            radio.push_frame(node(1), fa.clone());
            radio.push_frame(node(2), fb.clone());
        }

        let mut store = MockRelationalStore::new();
        store.expect_execute().times(202).returning(|_| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        let mut stored = 0;
        for _ in 0..a.len() + b.len() {
            if let PollOutcome::Stored(_) = gw.poll_once().await.unwrap() {
                stored += 1;
            }
        }
        assert_eq!(stored, 2);
    }

    #[tokio::test]
    async fn test_out_of_sequence_drops_message() {
        let radio = MockRadio::new();
        let parts = frames(&heart_envelope(100), 40);
        radio.push_frame(node(7), parts[0].clone());
        radio.push_frame(node(7), parts[2].clone());

        let mut gw = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);

        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Pending);
        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Dropped);
        assert_eq!(gw.pending_messages(), 0);
        assert_eq!(gw.stats().frames_dropped, 1);
    }

    #[tokio::test]
    async fn test_seed_policy_controls_mid_stream_start() {
        let parts = frames(&heart_envelope(100), 40);

        let radio = MockRadio::new();
        radio.push_frame(node(7), parts[1].clone());
        let mut strict = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);
        assert_eq!(strict.poll_once().await.unwrap(), PollOutcome::Dropped);

        let radio = MockRadio::new();
        radio.push_frame(node(7), parts[1].clone());
        let mut lenient = gateway(&radio, MockRelationalStore::new(), SeedPolicy::AnyPart);
        assert_eq!(lenient.poll_once().await.unwrap(), PollOutcome::Pending);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let radio = MockRadio::new();
        radio.push_frame(node(7), vec![0, 1]);

        let mut gw = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);
        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_truncated_message_not_stored() {
        let radio = MockRadio::new();
        // complete single fragment carrying a sensor header cut short
        radio.push_frame(node(7), vec![0, 1, 1, 3, 0, 50, 0]);

        let mut gw = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);
        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_unknown_sensor_kind_only_records_node() {
        let radio = MockRadio::new();
        // tag 0, base 50, kind 9, end 40, interval 200, len 0
        let message = vec![0, 50, 0, 0, 0, 9, 40, 0, 0, 0, 200, 0, 0];
        let mut frame = vec![0, 1, 1, message.len() as u8];
        frame.extend_from_slice(&message);
        radio.push_frame(node(7), frame);

        let mut store = MockRelationalStore::new();
        store
            .expect_execute()
            .withf(|s| s.table == Table::MonitoringNodes)
            .times(1)
            .returning(|_| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        assert!(matches!(gw.poll_once().await.unwrap(), PollOutcome::Stored(_)));
    }

    #[tokio::test]
    async fn test_receive_error_is_returned() {
        let radio = MockRadio::new();
        radio.push_frame(node(7), vec![0]);
        radio.set_receive_error(std::io::ErrorKind::BrokenPipe);

        let mut gw = gateway(&radio, MockRelationalStore::new(), SeedPolicy::FirstPart);
        assert!(matches!(gw.poll_once().await, Err(RadioError::Io(_))));
    }

    #[tokio::test]
    async fn test_shutdown_discards_pending_and_closes_once() {
        let radio = MockRadio::new();
        let parts = frames(&heart_envelope(100), 40);
        radio.push_frame(node(7), parts[0].clone());

        let mut store = MockRelationalStore::new();
        store.expect_close().times(1).returning(|| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Pending);

        gw.shutdown().unwrap();
        gw.shutdown().unwrap();
        assert!(gw.is_closed());
        assert_eq!(gw.pending_messages(), 0);
        assert_eq!(gw.poll_once().await.unwrap(), PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_run_processes_frames_until_shutdown() {
        let radio = MockRadio::new();
        for frame in frames(&heart_envelope(3), 84) {
            radio.push_frame(node(7), frame);
        }

        let mut store = MockRelationalStore::new();
        store.expect_execute().times(4).returning(|_| Ok(()));
        store.expect_close().times(1).returning(|| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let stats = gw.run(rx).await.unwrap();
        assert_eq!(stats.messages_stored, 1);
        assert_eq!(stats.rows_written, 4);
        assert!(gw.is_closed());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_signalled() {
        let radio = MockRadio::new();
        let mut store = MockRelationalStore::new();
        store.expect_close().times(1).returning(|| Ok(()));

        let mut gw = gateway(&radio, store, SeedPolicy::FirstPart);
        let (_tx, rx) = watch::channel(true);

        let stats = gw.run(rx).await.unwrap();
        assert_eq!(stats, GatewayStats::default());
    }
}
