use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use super::models::CommandRow;
use crate::{
    commands::{CommandResult, CommandStatus, CommandStore, Device, DeviceCommand, SwitchState},
    error::Result,
};

const COLUMNS: &str = "id, device, desired_state, actual_state, status, requested_by, \
                       requested_at, executed_at";

#[derive(Debug, Clone)]
pub struct MySqlCommandStore {
    pool: MySqlPool,
}

impl MySqlCommandStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommandStore for MySqlCommandStore {
    async fn insert(
        &self,
        device: Device,
        desired: SwitchState,
        requested_by: i64,
        requested_at: DateTime<Utc>,
    ) -> Result<i64> {
        let done = sqlx::query(
            "INSERT INTO device_commands (device, desired_state, status, requested_by, requested_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device.as_str())
        .bind(desired.as_str())
        .bind(CommandStatus::Pending.as_str())
        .bind(requested_by)
        .bind(requested_at)
        .execute(&self.pool)
        .await?;

        Ok(done.last_insert_id() as i64)
    }

    async fn get(&self, id: i64) -> Result<Option<DeviceCommand>> {
        let row = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COLUMNS} FROM device_commands WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeviceCommand::try_from).transpose()
    }

    async fn latest_for(&self, device: Device) -> Result<Option<DeviceCommand>> {
        let row = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COLUMNS} FROM device_commands \
             WHERE device = ? \
             ORDER BY requested_at DESC, id DESC \
             LIMIT 1"
        ))
        .bind(device.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeviceCommand::try_from).transpose()
    }

    async fn pending(&self) -> Result<Vec<DeviceCommand>> {
        let rows = sqlx::query_as::<_, CommandRow>(&format!(
            "SELECT {COLUMNS} FROM device_commands \
             WHERE status = ? \
             ORDER BY requested_at ASC, id ASC"
        ))
        .bind(CommandStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeviceCommand::try_from).collect()
    }

    async fn complete(
        &self,
        id: i64,
        result: CommandResult,
        executed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE device_commands \
             SET status = ?, actual_state = COALESCE(?, actual_state), executed_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(result.status.as_str())
        .bind(result.actual_state.map(SwitchState::as_str))
        .bind(executed_at)
        .bind(id)
        .bind(CommandStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() == 1)
    }
}
