//! # Storage Mapper
//!
//! Turns a decoded envelope into row statements.
//!
//! | Payload | Rows |
//! |---|---|
//! | Heart rate batch | one `sensorHeart` row per record |
//! | Raw temperature batch | one `sensorTemperature` row per record, calibrated object temperature |
//! | Accelerometer batch | one `sensorAccelerometer` row per record |
//! | GPS batch | one `sensorGPS` and one `sensorGPSDecimal` row per record |
//! | Debug | one `debugMessages` row |
//! | Config | none |
//! | Unknown tag or sensor kind | none, logged |
//!
//! Every message, whatever its payload, also upserts the sender into
//! `monitoringNodes`. Writes are best-effort: a failed row is logged and the
//! remaining rows are still attempted.

use tracing::{debug, warn};

use super::{RelationalStore, SqlValue, Statement, Table, UNDEFINED_IDENTIFIER};
use crate::calc::gps::decimal_position;
use crate::calc::thermopile::ThermopileCalibration;
use crate::calc::timestamp::{absolute_end, sample_offset_ms};
use crate::protocol::types::{MessageEnvelope, NodeAddress, Payload, SensorBatch, SensorRecords};

/// Outcome of storing one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReport {
    /// Statements the store accepted
    pub rows_written: usize,

    /// Statements the store rejected
    pub rows_failed: usize,
}

impl StoreReport {
    pub fn is_clean(&self) -> bool {
        self.rows_failed == 0
    }
}

/// Routes decoded envelopes to table rows
#[derive(Debug, Clone, Default)]
pub struct StorageMapper {
    calibration: ThermopileCalibration,
}

impl StorageMapper {
    pub fn new(calibration: ThermopileCalibration) -> Self {
        Self { calibration }
    }

    /// Statements for `envelope` received from `source` at `now` (Unix seconds)
    ///
    /// The node upsert is always the last statement.
    pub fn statements(&self, source: &NodeAddress, envelope: &MessageEnvelope, now: i64) -> Vec<Statement> {
        let mut statements = match &envelope.payload {
            Payload::SensorData(batch) => {
                let end = absolute_end(now, envelope.base_timestamp_rel, batch.end_timestamp_rel);
                self.sensor_rows(source.addr64, end, batch)
            }
            Payload::Debug(record) => {
                let at = absolute_end(now, envelope.base_timestamp_rel, record.timestamp_rel);
                vec![Statement::insert(
                    Table::DebugMessages,
                    vec![source.addr64.into(), at.into(), record.message.as_str().into()],
                )]
            }
            Payload::SensorConfig(config) => {
                debug!(
                    "Config message from {} with {} entries, nothing to store",
                    source,
                    config.entries.len()
                );
                Vec::new()
            }
            Payload::Unrecognized(tag) => {
                warn!("Message from {} has unknown tag {}, skipping rows", source, tag);
                Vec::new()
            }
        };

        statements.push(node_upsert(source));
        statements
    }

    /// Execute all statements for `envelope` against `store`
    pub fn store<S: RelationalStore + ?Sized>(
        &self,
        store: &mut S,
        source: &NodeAddress,
        envelope: &MessageEnvelope,
        now: i64,
    ) -> StoreReport {
        let mut report = StoreReport::default();

        for statement in self.statements(source, envelope, now) {
            match store.execute(&statement) {
                Ok(()) => {
                    debug!("{}", statement.to_sql());
                    report.rows_written += 1;
                }
                Err(e) => {
                    warn!("Failed to write {} row from {}: {}", statement.table, source, e);
                    report.rows_failed += 1;
                }
            }
        }

        report
    }

    fn sensor_rows(&self, addr64: u64, end: i64, batch: &SensorBatch) -> Vec<Statement> {
        let interval = batch.sample_interval_ms;
        let key = |i: usize| -> Vec<SqlValue> {
            vec![addr64.into(), end.into(), sample_offset_ms(i, interval).into()]
        };
        let row = |table: Table, i: usize, fields: Vec<SqlValue>| {
            let mut values = key(i);
            values.extend(fields);
            Statement::insert(table, values)
        };

        match &batch.records {
            SensorRecords::HeartRate(records) => records
                .iter()
                .enumerate()
                .map(|(i, r)| row(Table::SensorHeart, i, vec![r.bpm.into()]))
                .collect(),
            SensorRecords::RawTemperature(records) => records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let temp = self.calibration.object_temperature(r.v_obj, r.t_env);
                    row(Table::SensorTemperature, i, vec![temp.into()])
                })
                .collect(),
            SensorRecords::Accelerometer(records) => records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    row(Table::SensorAccelerometer, i, vec![r.x.into(), r.y.into(), r.z.into()])
                })
                .collect(),
            SensorRecords::Gps(records) => records
                .iter()
                .enumerate()
                .flat_map(|(i, r)| {
                    let position = decimal_position(r);
                    [
                        row(
                            Table::SensorGps,
                            i,
                            vec![
                                r.lat_deg.into(),
                                r.lat_min.into(),
                                r.lat_sec.into(),
                                r.lat_north.into(),
                                r.lon_deg.into(),
                                r.lon_min.into(),
                                r.lon_sec.into(),
                                r.lon_west.into(),
                                r.valid_fix.into(),
                            ],
                        ),
                        row(
                            Table::SensorGpsDecimal,
                            i,
                            vec![position.latitude.into(), position.longitude.into()],
                        ),
                    ]
                })
                .collect(),
            SensorRecords::Unrecognized { kind, declared_len } => {
                warn!(
                    "Unknown sensor kind {} ({} records declared), skipping rows",
                    kind, declared_len
                );
                Vec::new()
            }
        }
    }
}

fn node_upsert(source: &NodeAddress) -> Statement {
    let identifier = source.identifier.as_deref().unwrap_or(UNDEFINED_IDENTIFIER);
    Statement::upsert(
        Table::MonitoringNodes,
        vec![source.addr64.into(), source.addr16.into(), identifier.into()],
    )
}
