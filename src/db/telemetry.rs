use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tracing::debug;

use super::models::SensorDataRow;
use crate::{
    commands::{ActuatorStateSink, Device, SwitchState},
    error::Result,
    telemetry::{IngestReceipt, NewResourceRecord, NewSensorReading, SensorReading, TelemetryStore},
};

const COLUMNS: &str = "id, device_id, timestamp, soil_moisture_1, soil_moisture_2, \
                       soil_moisture_3, temperature, humidity, valve_status, pump_status, \
                       water_level_low, water_level_high";

#[derive(Debug, Clone)]
pub struct MySqlTelemetryStore {
    pool: MySqlPool,
}

impl MySqlTelemetryStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for MySqlTelemetryStore {
    async fn insert_batch(
        &self,
        r: &NewSensorReading,
        resources: &[NewResourceRecord],
    ) -> Result<IngestReceipt> {
        // Dropping `tx` on any early return rolls the batch back.
        let mut tx = self.pool.begin().await?;

        let sensor_data_id = sqlx::query(
            "INSERT INTO sensor_data \
             (device_id, timestamp, soil_moisture_1, soil_moisture_2, soil_moisture_3, \
              temperature, humidity, valve_status, pump_status, water_level_low, water_level_high) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&r.device_id)
        .bind(r.timestamp)
        .bind(r.soil_moisture_1)
        .bind(r.soil_moisture_2)
        .bind(r.soil_moisture_3)
        .bind(r.temperature)
        .bind(r.humidity)
        .bind(r.valve_status)
        .bind(r.pump_status)
        .bind(r.water_level_low)
        .bind(r.water_level_high)
        .execute(&mut *tx)
        .await?
        .last_insert_id() as i64;

        let mut inserted = 0;
        for rc in resources {
            inserted += sqlx::query(
                "INSERT INTO resource_consumption \
                 (resource_id, sensor_data_id, device_id, timestamp, pump_runtime_sec, \
                  valve_runtime_sec, water_consumed_liters, energy_consumed_kwh, \
                  pump_state, valve_state) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(rc.resource_id)
            .bind(sensor_data_id)
            .bind(&rc.device_id)
            .bind(rc.timestamp)
            .bind(rc.pump_runtime_sec)
            .bind(rc.valve_runtime_sec)
            .bind(rc.water_consumed_liters)
            .bind(rc.energy_consumed_kwh)
            .bind(rc.pump_state)
            .bind(rc.valve_state)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(sensor_data_id, inserted, "Telemetry transaction committed");

        Ok(IngestReceipt {
            sensor_data_id,
            resource_records_inserted: inserted,
        })
    }

    async fn latest(&self) -> Result<Option<SensorReading>> {
        let row = sqlx::query_as::<_, SensorDataRow>(&format!(
            "SELECT {COLUMNS} FROM sensor_data ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn history(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<SensorReading>> {
        // Newest `limit` rows inside the window, returned oldest first.
        let rows = sqlx::query_as::<_, SensorDataRow>(&format!(
            "SELECT * FROM ( \
                 SELECT {COLUMNS} FROM sensor_data \
                 WHERE timestamp > ? \
                 ORDER BY timestamp DESC, id DESC \
                 LIMIT ? \
             ) recent \
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ActuatorStateSink for MySqlTelemetryStore {
    async fn update_latest_reading_status(
        &self,
        device: Device,
        state: SwitchState,
    ) -> Result<bool> {
        let column = match device {
            Device::Pump => "pump_status",
            Device::Valve => "valve_status",
        };

        // MySQL applies ORDER BY / LIMIT to a single-table UPDATE, so this
        // touches exactly the newest row.
        let done = sqlx::query(&format!(
            "UPDATE sensor_data SET {column} = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(state.is_on())
        .execute(&self.pool)
        .await?;

        // MySQL reports changed rows, so an already-matching value counts as 0.
        if done.rows_affected() == 1 {
            return Ok(true);
        }
        let any: Option<i64> = sqlx::query_scalar("SELECT id FROM sensor_data LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(any.is_some())
    }
}
