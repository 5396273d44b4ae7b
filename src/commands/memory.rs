use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CommandResult, CommandStatus, CommandStore, Device, DeviceCommand, SwitchState};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryCommandStore {
    rows: Mutex<Vec<DeviceCommand>>,
}

impl MemoryCommandStore {
    pub fn all(&self) -> Vec<DeviceCommand> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn insert(
        &self,
        device: Device,
        desired: SwitchState,
        requested_by: i64,
        requested_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(DeviceCommand {
            id,
            device,
            desired_state: desired,
            actual_state: None,
            status: CommandStatus::Pending,
            requested_by,
            requested_at,
            executed_at: None,
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<DeviceCommand>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|c| c.id == id).cloned())
    }

    async fn latest_for(&self, device: Device) -> Result<Option<DeviceCommand>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|c| c.device == device)
            .max_by_key(|c| (c.requested_at, c.id))
            .cloned())
    }

    async fn pending(&self) -> Result<Vec<DeviceCommand>> {
        let rows = self.rows.lock().unwrap();
        let mut pending: Vec<_> = rows
            .iter()
            .filter(|c| c.status == CommandStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|c| (c.requested_at, c.id));
        Ok(pending)
    }

    async fn complete(
        &self,
        id: i64,
        result: CommandResult,
        executed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|c| c.id == id && c.status == CommandStatus::Pending)
        {
            Some(c) => {
                c.status = result.status;
                c.actual_state = result.actual_state.or(c.actual_state);
                c.executed_at = Some(executed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
