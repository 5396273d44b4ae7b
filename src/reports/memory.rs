use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{
    report_day, CommandCounts, CommandGroup, CommandGroupBy, DateRange, ReportStore,
    SensorStatsDay, WaterUsageDay,
};
use crate::{
    commands::{memory::MemoryCommandStore, CommandStatus, Device},
    error::Result,
    telemetry::{memory::MemoryTelemetryStore, SensorReading},
    users::memory::MemoryUserStore,
};

/// Aggregates straight over the in-memory stores.
pub struct MemoryReportStore {
    telemetry: Arc<MemoryTelemetryStore>,
    commands: Arc<MemoryCommandStore>,
    users: Arc<MemoryUserStore>,
}

impl MemoryReportStore {
    pub fn new(
        telemetry: Arc<MemoryTelemetryStore>,
        commands: Arc<MemoryCommandStore>,
        users: Arc<MemoryUserStore>,
    ) -> Self {
        Self { telemetry, commands, users }
    }
}

fn within(range: &DateRange, t: DateTime<Utc>) -> bool {
    let (from, to) = range.utc_bounds();
    t >= from && t < to
}

fn device_matches(filter: Option<&str>, device_id: &str) -> bool {
    filter.map_or(true, |f| f == device_id)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn command_counts(
        &self,
        range: &DateRange,
        group_by: CommandGroupBy,
        device: Option<Device>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<CommandGroup>> {
        let users = self.users.users();
        let mut groups: BTreeMap<String, CommandCounts> = BTreeMap::new();

        for c in self.commands.all() {
            if !within(range, c.requested_at)
                || device.is_some_and(|d| d != c.device)
                || status.is_some_and(|s| s != c.status)
            {
                continue;
            }
            let key = match group_by {
                CommandGroupBy::Device => c.device.as_str().to_owned(),
                CommandGroupBy::Status => c.status.as_str().to_owned(),
                CommandGroupBy::User => users
                    .iter()
                    .find(|u| u.id == c.requested_by)
                    .map(|u| u.username.clone())
                    .unwrap_or_else(|| format!("user#{}", c.requested_by)),
                CommandGroupBy::Day => report_day(c.requested_at).format("%Y-%m-%d").to_string(),
            };
            let counts = groups.entry(key).or_default();
            counts.total += 1;
            match c.status {
                CommandStatus::Success => counts.success += 1,
                CommandStatus::Failed => counts.failed += 1,
                CommandStatus::Pending => counts.pending += 1,
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, counts)| CommandGroup { key, counts })
            .collect())
    }

    async fn water_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<WaterUsageDay>> {
        let mut days: BTreeMap<NaiveDate, WaterUsageDay> = BTreeMap::new();
        for rc in self.telemetry.resources() {
            if !within(range, rc.timestamp) || !device_matches(device_id, &rc.device_id) {
                continue;
            }
            let day = report_day(rc.timestamp);
            let entry = days.entry(day).or_insert(WaterUsageDay {
                day,
                water_liters: 0.0,
                pump_runtime_sec: 0,
                valve_runtime_sec: 0,
                records: 0,
            });
            entry.water_liters += rc.water_consumed_liters;
            entry.pump_runtime_sec += rc.pump_runtime_sec;
            entry.valve_runtime_sec += rc.valve_runtime_sec;
            entry.records += 1;
        }
        Ok(days.into_values().collect())
    }

    async fn irrigation_energy_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeMap<NaiveDate, f64>> {
        let mut days = BTreeMap::new();
        for rc in self.telemetry.resources() {
            if within(range, rc.timestamp) && device_matches(device_id, &rc.device_id) {
                *days.entry(report_day(rc.timestamp)).or_insert(0.0) += rc.energy_consumed_kwh;
            }
        }
        Ok(days)
    }

    async fn active_days(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeSet<NaiveDate>> {
        let readings = self
            .telemetry
            .readings()
            .into_iter()
            .map(|r| (r.timestamp, r.device_id));
        let resources = self
            .telemetry
            .resources()
            .into_iter()
            .map(|rc| (rc.timestamp, rc.device_id));

        Ok(readings
            .chain(resources)
            .filter(|(t, dev)| within(range, *t) && device_matches(device_id, dev))
            .map(|(t, _)| report_day(t))
            .collect())
    }

    async fn sensor_stats_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<SensorStatsDay>> {
        let mut by_day: BTreeMap<NaiveDate, Vec<SensorReading>> = BTreeMap::new();
        for r in self.telemetry.readings() {
            if within(range, r.timestamp) && device_matches(device_id, &r.device_id) {
                by_day.entry(report_day(r.timestamp)).or_default().push(r);
            }
        }

        Ok(by_day
            .into_iter()
            .map(|(day, rows)| {
                let temperature: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
                let humidity: Vec<f64> = rows.iter().filter_map(|r| r.humidity).collect();
                let soil = |pick: fn(&SensorReading) -> f64| {
                    mean(&rows.iter().map(pick).collect::<Vec<_>>())
                };
                SensorStatsDay {
                    day,
                    samples: rows.len() as i64,
                    avg_temperature: mean(&temperature),
                    min_temperature: min(&temperature),
                    max_temperature: max(&temperature),
                    avg_humidity: mean(&humidity),
                    min_humidity: min(&humidity),
                    max_humidity: max(&humidity),
                    avg_soil_moisture_1: soil(|r| r.soil_moisture_1),
                    avg_soil_moisture_2: soil(|r| r.soil_moisture_2),
                    avg_soil_moisture_3: soil(|r| r.soil_moisture_3),
                }
            })
            .collect())
    }
}
