//! Row shapes as MySQL returns them.
//!
//! Enumerated columns are plain `VARCHAR`s and are decoded as `String`, then
//! parsed into the domain enums. A value outside the enumeration means the
//! row was written by something other than this service and is an error.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    commands::DeviceCommand,
    error::{Error, Result},
    telemetry::SensorReading,
    users::User,
};

#[derive(Debug, Clone, FromRow)]
pub struct CommandRow {
    pub id: i64,
    pub device: String,
    pub desired_state: String,
    pub actual_state: Option<String>,
    pub status: String,
    pub requested_by: i64,
    pub requested_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommandRow> for DeviceCommand {
    type Error = Error;

    fn try_from(r: CommandRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            device: r.device.parse().map_err(corrupt("device_commands", r.id))?,
            desired_state: r
                .desired_state
                .parse()
                .map_err(corrupt("device_commands", r.id))?,
            actual_state: r
                .actual_state
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(corrupt("device_commands", r.id))?,
            status: r.status.parse().map_err(corrupt("device_commands", r.id))?,
            requested_by: r.requested_by,
            requested_at: r.requested_at,
            executed_at: r.executed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SensorDataRow {
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

impl From<SensorDataRow> for SensorReading {
    fn from(r: SensorDataRow) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
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
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(r: UserRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            role: r.role.parse().map_err(corrupt("users", r.id))?,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            is_active: r.is_active,
            created_at: r.created_at,
        })
    }
}

fn corrupt(table: &'static str, id: i64) -> impl Fn(Error) -> Error {
    move |e| Error::Internal(anyhow::anyhow!("{table} row {id} is malformed: {e}"))
}
