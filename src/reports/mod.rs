//! Read-only aggregations over the store.
//!
//! Report days are calendar days in UTC+8. A range covers both endpoint days
//! in full. Resource and sensor reports refuse ranges ending after today.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    commands::{CommandStatus, Device},
    error::{Error, Result},
};

#[cfg(test)]
pub mod memory;

pub const REPORT_UTC_OFFSET_HOURS: i32 = 8;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReportParams {
    /// First day, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Last day, `YYYY-MM-DD`, inclusive.
    pub end_date: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CommandReportParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// `pump` or `valve`.
    pub device: Option<String>,
    /// `PENDING`, `SUCCESS` or `FAILED`.
    pub status: Option<String>,
    /// `device` (default), `status`, `user` or `day`.
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommandGroupBy {
    Device,
    Status,
    User,
    Day,
}

impl std::str::FromStr for CommandGroupBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "device" => Ok(Self::Device),
            "status" => Ok(Self::Status),
            "user" => Ok(Self::User),
            "day" => Ok(Self::Day),
            other => Err(Error::invalid(format!("invalid groupBy: {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let (Some(start), Some(end)) = (start, end) else {
            return Err(Error::invalid("startDate and endDate are required"));
        };
        let start = parse_day("startDate", start)?;
        let end = parse_day("endDate", end)?;
        if start > end {
            return Err(Error::invalid("startDate must not be after endDate"));
        }
        Ok(Self { start, end })
    }

    pub fn reject_future(&self, now: DateTime<Utc>) -> Result<()> {
        let today = report_day(now);
        if self.end > today {
            return Err(Error::invalid(format!(
                "endDate {} is in the future (today is {today})",
                self.end
            )));
        }
        Ok(())
    }

    /// Half-open UTC interval `[start 00:00, end + 1 day 00:00)` in report time.
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let offset = Duration::hours(i64::from(REPORT_UTC_OFFSET_HOURS));
        let midnight = |d: NaiveDate| (d.and_time(NaiveTime::MIN) - offset).and_utc();
        (midnight(self.start), midnight(self.end + Duration::days(1)))
    }
}

fn parse_day(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::invalid(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

/// Calendar day of `t` in report time.
pub fn report_day(t: DateTime<Utc>) -> NaiveDate {
    (t + Duration::hours(i64::from(REPORT_UTC_OFFSET_HOURS))).date_naive()
}

// ---------------------------------------------------------------------------
// Report shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CommandCounts {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CommandGroup {
    pub key: String,
    #[serde(flatten)]
    pub counts: CommandCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CommandReport {
    pub range: DateRange,
    pub group_by: CommandGroupBy,
    pub groups: Vec<CommandGroup>,
    pub totals: CommandCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WaterUsageDay {
    pub day: NaiveDate,
    pub water_liters: f64,
    pub pump_runtime_sec: i64,
    pub valve_runtime_sec: i64,
    pub records: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WaterUsageReport {
    pub range: DateRange,
    pub days: Vec<WaterUsageDay>,
    pub total_water_liters: f64,
    pub total_pump_runtime_sec: i64,
    pub total_valve_runtime_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EnergyUsageDay {
    pub day: NaiveDate,
    pub irrigation_kwh: f64,
    pub fixed_kwh: f64,
    pub total_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EnergyUsageReport {
    pub range: DateRange,
    pub fixed_daily_kwh: f64,
    pub active_days: usize,
    pub days: Vec<EnergyUsageDay>,
    pub total_irrigation_kwh: f64,
    pub total_fixed_kwh: f64,
    pub total_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SensorStatsDay {
    pub day: NaiveDate,
    pub samples: i64,
    pub avg_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub avg_soil_moisture_1: Option<f64>,
    pub avg_soil_moisture_2: Option<f64>,
    pub avg_soil_moisture_3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SensorStatsReport {
    pub range: DateRange,
    pub days: Vec<SensorStatsDay>,
    pub samples: i64,
}

/// One entry per active day, in order. A day is active when it has a sensor
/// or resource row; every metered day therefore carries the flat draw too.
pub fn combine_energy(
    irrigation: &BTreeMap<NaiveDate, f64>,
    active_days: &BTreeSet<NaiveDate>,
    fixed_daily_kwh: f64,
) -> Vec<EnergyUsageDay> {
    let mut days = active_days.clone();
    days.extend(irrigation.keys().copied());

    days.into_iter()
        .map(|day| {
            let irrigation_kwh = irrigation.get(&day).copied().unwrap_or(0.0);
            EnergyUsageDay {
                day,
                irrigation_kwh,
                fixed_kwh: fixed_daily_kwh,
                total_kwh: irrigation_kwh + fixed_daily_kwh,
            }
        })
        .collect()
}

fn sum_counts<'a>(groups: impl IntoIterator<Item = &'a CommandGroup>) -> CommandCounts {
    groups
        .into_iter()
        .fold(CommandCounts::default(), |mut acc, g| {
            acc.total += g.counts.total;
            acc.success += g.counts.success;
            acc.failed += g.counts.failed;
            acc.pending += g.counts.pending;
            acc
        })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Per-day aggregates over `range`, bucketed by [`report_day`].
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Groups ordered by key.
    async fn command_counts(
        &self,
        range: &DateRange,
        group_by: CommandGroupBy,
        device: Option<Device>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<CommandGroup>>;

    /// Days with resource rows, oldest first.
    async fn water_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<WaterUsageDay>>;

    async fn irrigation_energy_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeMap<NaiveDate, f64>>;

    /// Days with at least one sensor or resource row.
    async fn active_days(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeSet<NaiveDate>>;

    /// Days with sensor rows, oldest first.
    async fn sensor_stats_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<SensorStatsDay>>;
}

// ---------------------------------------------------------------------------
// ReportService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    fixed_daily_energy_kwh: f64,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportStore>, fixed_daily_energy_kwh: f64) -> Self {
        Self { store, fixed_daily_energy_kwh }
    }

    pub async fn commands(&self, p: &CommandReportParams) -> Result<CommandReport> {
        let range = DateRange::parse(p.start_date.as_deref(), p.end_date.as_deref())?;
        let device = p.device.as_deref().map(str::parse::<Device>).transpose()?;
        let status = p.status.as_deref().map(str::parse::<CommandStatus>).transpose()?;
        let group_by = p
            .group_by
            .as_deref()
            .map(str::parse::<CommandGroupBy>)
            .transpose()?
            .unwrap_or(CommandGroupBy::Device);

        let groups = self.store.command_counts(&range, group_by, device, status).await?;
        let totals = sum_counts(&groups);
        Ok(CommandReport { range, group_by, groups, totals })
    }

    pub async fn water_usage(&self, p: &ReportParams) -> Result<WaterUsageReport> {
        let range = self.resource_range(p)?;
        let days = self.store.water_by_day(&range, p.device_id.as_deref()).await?;
        Ok(WaterUsageReport {
            range,
            total_water_liters: days.iter().map(|d| d.water_liters).sum(),
            total_pump_runtime_sec: days.iter().map(|d| d.pump_runtime_sec).sum(),
            total_valve_runtime_sec: days.iter().map(|d| d.valve_runtime_sec).sum(),
            days,
        })
    }

    pub async fn energy_usage(&self, p: &ReportParams) -> Result<EnergyUsageReport> {
        let range = self.resource_range(p)?;
        let device = p.device_id.as_deref();
        let irrigation = self.store.irrigation_energy_by_day(&range, device).await?;
        let active = self.store.active_days(&range, device).await?;

        let days = combine_energy(&irrigation, &active, self.fixed_daily_energy_kwh);
        let total_irrigation_kwh: f64 = days.iter().map(|d| d.irrigation_kwh).sum();
        let total_fixed_kwh: f64 = days.iter().map(|d| d.fixed_kwh).sum();
        Ok(EnergyUsageReport {
            range,
            fixed_daily_kwh: self.fixed_daily_energy_kwh,
            active_days: days.len(),
            total_irrigation_kwh,
            total_fixed_kwh,
            total_kwh: total_irrigation_kwh + total_fixed_kwh,
            days,
        })
    }

    pub async fn sensor_stats(&self, p: &ReportParams) -> Result<SensorStatsReport> {
        let range = self.resource_range(p)?;
        let days = self.store.sensor_stats_by_day(&range, p.device_id.as_deref()).await?;
        Ok(SensorStatsReport {
            range,
            samples: days.iter().map(|d| d.samples).sum(),
            days,
        })
    }

    fn resource_range(&self, p: &ReportParams) -> Result<DateRange> {
        let range = DateRange::parse(p.start_date.as_deref(), p.end_date.as_deref())?;
        range.reject_future(Utc::now())?;
        Ok(range)
    }
}
