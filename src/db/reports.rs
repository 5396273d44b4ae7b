use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};

use crate::{
    commands::{CommandStatus, Device},
    error::Result,
    reports::{
        CommandCounts, CommandGroup, CommandGroupBy, DateRange, ReportStore, SensorStatsDay,
        WaterUsageDay, REPORT_UTC_OFFSET_HOURS,
    },
};

#[derive(Debug, Clone)]
pub struct MySqlReportStore {
    pool: MySqlPool,
}

#[derive(FromRow)]
struct CommandCountRow {
    group_key: String,
    total: i64,
    success: i64,
    failed: i64,
    pending: i64,
}

#[derive(FromRow)]
struct WaterRow {
    day: NaiveDate,
    water_liters: f64,
    pump_runtime_sec: i64,
    valve_runtime_sec: i64,
    records: i64,
}

#[derive(FromRow)]
struct EnergyRow {
    day: NaiveDate,
    kwh: f64,
}

#[derive(FromRow)]
struct SensorStatsRow {
    day: NaiveDate,
    samples: i64,
    avg_temperature: Option<f64>,
    min_temperature: Option<f64>,
    max_temperature: Option<f64>,
    avg_humidity: Option<f64>,
    min_humidity: Option<f64>,
    max_humidity: Option<f64>,
    avg_soil_moisture_1: Option<f64>,
    avg_soil_moisture_2: Option<f64>,
    avg_soil_moisture_3: Option<f64>,
}

/// `column` shifted into report time.
fn local(column: &str) -> String {
    format!("DATE_ADD({column}, INTERVAL {REPORT_UTC_OFFSET_HOURS} HOUR)")
}

/// Appends `WHERE column >= start AND column < end+1`.
fn push_range(qb: &mut QueryBuilder<'_, MySql>, column: &str, range: &DateRange) {
    let (from, to) = range.utc_bounds();
    qb.push(format!(" WHERE {column} >= "))
        .push_bind(from)
        .push(format!(" AND {column} < "))
        .push_bind(to);
}

fn push_device(qb: &mut QueryBuilder<'_, MySql>, device_id: Option<&str>) {
    if let Some(device_id) = device_id {
        qb.push(" AND device_id = ").push_bind(device_id.to_owned());
    }
}

impl MySqlReportStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for MySqlReportStore {
    async fn command_counts(
        &self,
        range: &DateRange,
        group_by: CommandGroupBy,
        device: Option<Device>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<CommandGroup>> {
        let key = match group_by {
            CommandGroupBy::Device => "c.device".to_owned(),
            CommandGroupBy::Status => "c.status".to_owned(),
            CommandGroupBy::User => {
                "COALESCE(u.username, CONCAT('user#', c.requested_by))".to_owned()
            }
            CommandGroupBy::Day => format!("DATE_FORMAT({}, '%Y-%m-%d')", local("c.requested_at")),
        };

        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {key} AS group_key, \
                    COUNT(*) AS total, \
                    CAST(COALESCE(SUM(c.status = 'SUCCESS'), 0) AS SIGNED) AS success, \
                    CAST(COALESCE(SUM(c.status = 'FAILED'), 0) AS SIGNED) AS failed, \
                    CAST(COALESCE(SUM(c.status = 'PENDING'), 0) AS SIGNED) AS pending \
             FROM device_commands c \
             LEFT JOIN users u ON u.id = c.requested_by"
        ));
        push_range(&mut qb, "c.requested_at", range);
        if let Some(device) = device {
            qb.push(" AND c.device = ").push_bind(device.as_str());
        }
        if let Some(status) = status {
            qb.push(" AND c.status = ").push_bind(status.as_str());
        }
        qb.push(" GROUP BY group_key ORDER BY group_key");

        let rows: Vec<CommandCountRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| CommandGroup {
                key: r.group_key,
                counts: CommandCounts {
                    total: r.total,
                    success: r.success,
                    failed: r.failed,
                    pending: r.pending,
                },
            })
            .collect())
    }

    async fn water_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<WaterUsageDay>> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT DATE({}) AS day, \
                    CAST(COALESCE(SUM(water_consumed_liters), 0) AS DOUBLE) AS water_liters, \
                    CAST(COALESCE(SUM(pump_runtime_sec), 0) AS SIGNED) AS pump_runtime_sec, \
                    CAST(COALESCE(SUM(valve_runtime_sec), 0) AS SIGNED) AS valve_runtime_sec, \
                    COUNT(*) AS records \
             FROM resource_consumption",
            local("timestamp")
        ));
        push_range(&mut qb, "timestamp", range);
        push_device(&mut qb, device_id);
        qb.push(" GROUP BY day ORDER BY day");

        let rows: Vec<WaterRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| WaterUsageDay {
                day: r.day,
                water_liters: r.water_liters,
                pump_runtime_sec: r.pump_runtime_sec,
                valve_runtime_sec: r.valve_runtime_sec,
                records: r.records,
            })
            .collect())
    }

    async fn irrigation_energy_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeMap<NaiveDate, f64>> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT DATE({}) AS day, \
                    CAST(COALESCE(SUM(energy_consumed_kwh), 0) AS DOUBLE) AS kwh \
             FROM resource_consumption",
            local("timestamp")
        ));
        push_range(&mut qb, "timestamp", range);
        push_device(&mut qb, device_id);
        qb.push(" GROUP BY day");

        let rows: Vec<EnergyRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| (r.day, r.kwh)).collect())
    }

    async fn active_days(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<BTreeSet<NaiveDate>> {
        let day = format!("DATE({})", local("timestamp"));
        let mut qb = QueryBuilder::<MySql>::new(format!("SELECT DISTINCT {day} AS day FROM sensor_data"));
        push_range(&mut qb, "timestamp", range);
        push_device(&mut qb, device_id);
        qb.push(format!(" UNION SELECT DISTINCT {day} AS day FROM resource_consumption"));
        push_range(&mut qb, "timestamp", range);
        push_device(&mut qb, device_id);

        let days: Vec<NaiveDate> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(days.into_iter().collect())
    }

    async fn sensor_stats_by_day(
        &self,
        range: &DateRange,
        device_id: Option<&str>,
    ) -> Result<Vec<SensorStatsDay>> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT DATE({}) AS day, \
                    COUNT(*) AS samples, \
                    CAST(AVG(temperature) AS DOUBLE) AS avg_temperature, \
                    MIN(temperature) AS min_temperature, \
                    MAX(temperature) AS max_temperature, \
                    CAST(AVG(humidity) AS DOUBLE) AS avg_humidity, \
                    MIN(humidity) AS min_humidity, \
                    MAX(humidity) AS max_humidity, \
                    CAST(AVG(soil_moisture_1) AS DOUBLE) AS avg_soil_moisture_1, \
                    CAST(AVG(soil_moisture_2) AS DOUBLE) AS avg_soil_moisture_2, \
                    CAST(AVG(soil_moisture_3) AS DOUBLE) AS avg_soil_moisture_3 \
             FROM sensor_data",
            local("timestamp")
        ));
        push_range(&mut qb, "timestamp", range);
        push_device(&mut qb, device_id);
        qb.push(" GROUP BY day ORDER BY day");

        let rows: Vec<SensorStatsRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| SensorStatsDay {
                day: r.day,
                samples: r.samples,
                avg_temperature: r.avg_temperature,
                min_temperature: r.min_temperature,
                max_temperature: r.max_temperature,
                avg_humidity: r.avg_humidity,
                min_humidity: r.min_humidity,
                max_humidity: r.max_humidity,
                avg_soil_moisture_1: r.avg_soil_moisture_1,
                avg_soil_moisture_2: r.avg_soil_moisture_2,
                avg_soil_moisture_3: r.avg_soil_moisture_3,
            })
            .collect())
    }
}
