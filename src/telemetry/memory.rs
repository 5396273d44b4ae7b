use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{IngestReceipt, NewResourceRecord, NewSensorReading, SensorReading, TelemetryStore};
use crate::{
    commands::{ActuatorStateSink, Device, SwitchState},
    error::{Error, Result},
};

#[derive(Default)]
pub struct MemoryTelemetryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    readings: Vec<SensorReading>,
    /// Records with their parent `sensor_data_id`, in insertion order.
    resources: Vec<(NewResourceRecord, i64)>,
    next_id: i64,
}

impl MemoryTelemetryStore {
    pub fn reading_count(&self) -> usize {
        self.inner.lock().unwrap().readings.len()
    }

    pub fn resource_count(&self) -> usize {
        self.inner.lock().unwrap().resources.len()
    }

    /// `(resource_id, sensor_data_id)` in insertion order.
    pub fn resource_links(&self) -> Vec<(i64, i64)> {
        let inner = self.inner.lock().unwrap();
        inner.resources.iter().map(|(rc, id)| (rc.resource_id, *id)).collect()
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.inner.lock().unwrap().readings.clone()
    }

    pub fn resources(&self) -> Vec<NewResourceRecord> {
        let inner = self.inner.lock().unwrap();
        inner.resources.iter().map(|(rc, _)| rc.clone()).collect()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn insert_batch(
        &self,
        r: &NewSensorReading,
        resources: &[NewResourceRecord],
    ) -> Result<IngestReceipt> {
        let mut inner = self.inner.lock().unwrap();

        // Check everything before touching state so a conflict leaves no trace.
        let mut seen: HashSet<i64> = inner.resources.iter().map(|(rc, _)| rc.resource_id).collect();
        for rc in resources {
            if !seen.insert(rc.resource_id) {
                return Err(Error::conflict(format!(
                    "duplicate resource_id {}",
                    rc.resource_id
                )));
            }
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.readings.push(SensorReading {
            id,
            device_id: r.device_id.clone(),
            timestamp: r.timestamp,
            soil_moisture_1: r.soil_moisture_1,
            soil_moisture_2: r.soil_moisture_2,
            soil_moisture_3: r.soil_moisture_3,
            temperature: r.temperature,
            humidity: r.humidity,
            valve_status: r.valve_status,
            pump_status: r.pump_status,
            water_level_low: r.water_level_low,
            water_level_high: r.water_level_high,
        });
        inner
            .resources
            .extend(resources.iter().map(|rc| (rc.clone(), id)));

        Ok(IngestReceipt {
            sensor_data_id: id,
            resource_records_inserted: resources.len() as u64,
        })
    }

    async fn latest(&self) -> Result<Option<SensorReading>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .readings
            .iter()
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    async fn history(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<SensorReading>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<_> = inner
            .readings
            .iter()
            .filter(|r| r.timestamp > since)
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse((r.timestamp, r.id)));
        rows.truncate(limit as usize);
        rows.reverse();
        Ok(rows)
    }
}

#[async_trait]
impl ActuatorStateSink for MemoryTelemetryStore {
    async fn update_latest_reading_status(&self, device: Device, state: SwitchState) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(latest) = inner.readings.iter_mut().max_by_key(|r| (r.timestamp, r.id)) else {
            return Ok(false);
        };
        match device {
            Device::Pump => latest.pump_status = state.is_on(),
            Device::Valve => latest.valve_status = state.is_on(),
        }
        Ok(true)
    }
}
