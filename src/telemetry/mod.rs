#[cfg(test)]
pub mod memory;
pub mod payload;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    notify::{MoistureAlert, Notifier},
};

use self::payload::{IngestPayload, TimestampInput};

/// Upper bound for `history` windows.
pub const MAX_HISTORY_HOURS: u32 = 168;
/// Rows returned by a single `history` call.
pub const HISTORY_ROW_LIMIT: u32 = 2_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NewSensorReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub soil_moisture_1: f64,
    pub soil_moisture_2: f64,
    pub soil_moisture_3: f64,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub valve_status: bool,
    pub pump_status: bool,
    pub water_level_low: bool,
    pub water_level_high: bool,
}

/// One row of `sensor_data`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SensorReading {
    pub id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub soil_moisture_1: f64,
    pub soil_moisture_2: f64,
    pub soil_moisture_3: f64,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub valve_status: bool,
    pub pump_status: bool,
    pub water_level_low: bool,
    pub water_level_high: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResourceRecord {
    pub resource_id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub pump_runtime_sec: i64,
    pub valve_runtime_sec: i64,
    pub water_consumed_liters: f64,
    pub energy_consumed_kwh: f64,
    pub pump_state: bool,
    pub valve_state: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct IngestReceipt {
    pub sensor_data_id: i64,
    pub resource_records_inserted: u64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Inserts the reading and its resource records in one transaction.
    /// A duplicate `resource_id` rolls the whole batch back with `Conflict`.
    async fn insert_batch(
        &self,
        reading: &NewSensorReading,
        resources: &[NewResourceRecord],
    ) -> Result<IngestReceipt>;

    async fn latest(&self) -> Result<Option<SensorReading>>;

    /// Readings newer than `since`, oldest first, at most `limit` rows
    /// counted back from the newest.
    async fn history(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<SensorReading>>;
}

// ---------------------------------------------------------------------------
// IngestService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn TelemetryStore>,
    notifier: Arc<dyn Notifier>,
    default_device_id: String,
    moisture_threshold: f64,
    /// In-flight alert deliveries.
    alerts: Arc<Mutex<JoinSet<()>>>,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        notifier: Arc<dyn Notifier>,
        default_device_id: impl Into<String>,
        moisture_threshold: f64,
    ) -> Self {
        Self {
            store,
            notifier,
            default_device_id: default_device_id.into(),
            moisture_threshold,
            alerts: Arc::default(),
        }
    }

    /// Validates and persists one telemetry batch, then fires the
    /// critical-moisture alert in the background if any soil channel is dry.
    pub async fn ingest(&self, payload: IngestPayload) -> Result<IngestReceipt> {
        let required = payload.required()?;
        let now = Utc::now();

        let device_id = payload
            .device_id
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| self.default_device_id.clone());
        let timestamp = effective_timestamp(payload.timestamp.as_ref(), now)?;

        let reading = NewSensorReading {
            device_id,
            timestamp,
            soil_moisture_1: required.soil[0],
            soil_moisture_2: required.soil[1],
            soil_moisture_3: required.soil[2],
            temperature: required.temperature,
            humidity: payload.humidity,
            valve_status: payload.valve,
            pump_status: payload.pump,
            water_level_low: payload.low_level,
            water_level_high: payload.high_level,
        };

        let mut resources = Vec::with_capacity(payload.resource_consumption.len());
        for rc in &payload.resource_consumption {
            if rc.resource_id == 0 {
                continue;
            }
            resources.push(NewResourceRecord {
                resource_id: rc.resource_id,
                device_id: rc.device_id.clone().unwrap_or_else(|| reading.device_id.clone()),
                timestamp: match rc.timestamp.as_ref() {
                    Some(_) => effective_timestamp(rc.timestamp.as_ref(), now)?,
                    None => reading.timestamp,
                },
                pump_runtime_sec: rc.pump_runtime_sec,
                valve_runtime_sec: rc.valve_runtime_sec,
                water_consumed_liters: rc.water_consumed_liters,
                energy_consumed_kwh: rc.energy_consumed_kwh,
                pump_state: rc.pump_state,
                valve_state: rc.valve_state,
            });
        }

        if let Some(rollup) = &payload.total_resources_last_5min {
            debug!(device_id = %reading.device_id, rollup = %rollup, "Rollup received (not stored)");
        }

        let receipt = self.store.insert_batch(&reading, &resources).await?;
        info!(
            sensor_data_id = receipt.sensor_data_id,
            device_id = %reading.device_id,
            resource_records = receipt.resource_records_inserted,
            "Telemetry batch stored"
        );

        let alert = MoistureAlert {
            sensor_data_id: receipt.sensor_data_id,
            device_id: reading.device_id,
            recorded_at: reading.timestamp,
            soil_moisture: required.soil,
            threshold: self.moisture_threshold,
        };
        if !alert.critical_channels().is_empty() {
            let notifier = Arc::clone(&self.notifier);
            let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
            while alerts.try_join_next().is_some() {}
            alerts.spawn(async move {
                if let Err(e) = notifier.critical_moisture(&alert).await {
                    error!(sensor_data_id = alert.sensor_data_id, error = %e, "Critical moisture notification failed");
                }
            });
        }

        Ok(receipt)
    }

    /// Waits up to `grace` for alerts still being delivered, then aborts the rest.
    pub async fn drain_alerts(&self, grace: StdDuration) {
        let mut pending =
            std::mem::take(&mut *self.alerts.lock().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return;
        }
        info!(alerts = pending.len(), "Waiting for moisture alerts");
        let drained = tokio::time::timeout(grace, async {
            while pending.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!(abandoned = pending.len(), "Moisture alerts still undelivered at shutdown");
        }
    }

    pub async fn latest(&self) -> Result<Option<SensorReading>> {
        self.store.latest().await
    }

    pub async fn history(&self, hours: u32) -> Result<Vec<SensorReading>> {
        if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
            return Err(Error::invalid(format!(
                "hours must be between 1 and {MAX_HISTORY_HOURS}"
            )));
        }
        let since = Utc::now() - Duration::hours(i64::from(hours));
        self.store.history(since, HISTORY_ROW_LIMIT).await
    }
}

/// Caller time if present and not ahead of `now`, otherwise `now`.
fn effective_timestamp(input: Option<&TimestampInput>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let Some(input) = input else {
        return Ok(now);
    };
    let ts = input.parse()?;
    if ts > now {
        warn!(timestamp = %ts, now = %now, "Future timestamp clamped to server time");
        return Ok(now);
    }
    Ok(ts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
