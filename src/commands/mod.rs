//! Operator → device command queue.
//!
//! Commands are rows in `device_commands`. The operator submits, the field
//! device polls for pending work and reports the outcome. The store is the
//! only coordination point between the two.
//!
//! ```text
//! PENDING ──► SUCCESS
//!    │
//!    └──────► FAILED
//! ```
//!
//! Both outcomes are terminal. A second report for the same command is a
//! `Conflict`.

#[cfg(test)]
pub mod memory;

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Pump,
    Valve,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Pump => "pump",
            Device::Valve => "valve",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchState::On => "ON",
            SwitchState::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == SwitchState::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Success,
    Failed,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Success => "SUCCESS",
            CommandStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != CommandStatus::Pending
    }
}

macro_rules! text_enum {
    ($ty:ty, $what:literal, { $($s:literal => $v:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($s => Ok($v),)+
                    other => Err(Error::invalid(format!(
                        concat!("invalid ", $what, ": {:?}"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Device, "device", { "pump" => Device::Pump, "valve" => Device::Valve });
text_enum!(SwitchState, "state", { "ON" => SwitchState::On, "OFF" => SwitchState::Off });
text_enum!(CommandStatus, "status", {
    "PENDING" => CommandStatus::Pending,
    "SUCCESS" => CommandStatus::Success,
    "FAILED" => CommandStatus::Failed,
});

/// One row of `device_commands`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DeviceCommand {
    pub id: i64,
    pub device: Device,
    pub desired_state: SwitchState,
    pub actual_state: Option<SwitchState>,
    pub status: CommandStatus,
    pub requested_by: i64,
    pub requested_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// What the device receives when it polls.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PendingCommand {
    pub device: Device,
    pub state: SwitchState,
    pub command_id: i64,
}

impl From<&DeviceCommand> for PendingCommand {
    fn from(c: &DeviceCommand) -> Self {
        Self {
            device: c.device,
            state: c.desired_state,
            command_id: c.id,
        }
    }
}

/// Newest command per device, `None` if the device was never commanded.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LatestStatus {
    pub pump: Option<DeviceCommand>,
    pub valve: Option<DeviceCommand>,
}

/// A validated execution report from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub actual_state: Option<SwitchState>,
}

impl CommandResult {
    /// `status` must be terminal, and `SUCCESS` must carry the actual state.
    pub fn new(status: CommandStatus, actual_state: Option<SwitchState>) -> Result<Self> {
        match (status, actual_state) {
            (CommandStatus::Pending, _) => Err(Error::invalid(
                "status must be SUCCESS or FAILED",
            )),
            (CommandStatus::Success, None) => Err(Error::invalid(
                "actual_state is required when status is SUCCESS",
            )),
            _ => Ok(Self { status, actual_state }),
        }
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn insert(
        &self,
        device: Device,
        desired: SwitchState,
        requested_by: i64,
        requested_at: DateTime<Utc>,
    ) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<Option<DeviceCommand>>;

    /// Newest by `requested_at`, ties broken by highest id.
    async fn latest_for(&self, device: Device) -> Result<Option<DeviceCommand>>;

    /// All `PENDING` rows, oldest request first, ties broken by lowest id.
    async fn pending(&self) -> Result<Vec<DeviceCommand>>;

    /// Moves a `PENDING` command to its terminal state in one conditional
    /// write. Returns `false` when no pending row with that id existed.
    async fn complete(
        &self,
        id: i64,
        result: CommandResult,
        executed_at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Mirrors a confirmed actuator state onto the newest sensor reading so the
/// dashboard does not wait for the next telemetry cycle.
#[async_trait]
pub trait ActuatorStateSink: Send + Sync {
    /// Returns `false` when there is no reading to patch.
    async fn update_latest_reading_status(&self, device: Device, state: SwitchState)
        -> Result<bool>;
}

/// Hands pending work to the device. Polling over HTTP is the only
/// transport today.
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn next_batch(&self) -> Result<Vec<PendingCommand>>;
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CommandQueue {
    store: Arc<dyn CommandStore>,
    actuators: Arc<dyn ActuatorStateSink>,
}

impl CommandQueue {
    pub fn new(store: Arc<dyn CommandStore>, actuators: Arc<dyn ActuatorStateSink>) -> Self {
        Self { store, actuators }
    }

    pub async fn submit(
        &self,
        device: Device,
        desired: SwitchState,
        requested_by: i64,
    ) -> Result<i64> {
        let id = self
            .store
            .insert(device, desired, requested_by, Utc::now())
            .await?;
        info!(command_id = id, device = %device, state = %desired, requested_by, "Command queued");
        Ok(id)
    }

    pub async fn latest_status(&self) -> Result<LatestStatus> {
        Ok(LatestStatus {
            pump: self.store.latest_for(Device::Pump).await?,
            valve: self.store.latest_for(Device::Valve).await?,
        })
    }

    pub async fn list_pending(&self) -> Result<Vec<PendingCommand>> {
        let rows = self.store.pending().await?;
        Ok(rows.iter().map(PendingCommand::from).collect())
    }

    /// Records the device's execution report and returns the updated command.
    pub async fn report_result(&self, id: i64, result: CommandResult) -> Result<DeviceCommand> {
        let command = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("command {id} not found")))?;

        if command.status.is_terminal() {
            return Err(already_terminal(&command));
        }

        let executed_at = Utc::now();
        if !self.store.complete(id, result, executed_at).await? {
            // Lost a race with another report for the same command.
            let current = self.store.get(id).await?.unwrap_or(command);
            return Err(already_terminal(&current));
        }

        info!(
            command_id = id,
            device = %command.device,
            status = %result.status,
            actual_state = ?result.actual_state,
            "Command completed"
        );

        if let (CommandStatus::Success, Some(state)) = (result.status, result.actual_state) {
            self.apply_actuator_result(command.device, state).await;
        }

        Ok(DeviceCommand {
            status: result.status,
            actual_state: result.actual_state.or(command.actual_state),
            executed_at: Some(executed_at),
            ..command
        })
    }

    /// The command row is already terminal at this point, so a failure here
    /// is logged rather than reported to the device.
    async fn apply_actuator_result(&self, device: Device, state: SwitchState) {
        match self.actuators.update_latest_reading_status(device, state).await {
            Ok(true) => info!(device = %device, state = %state, "Latest reading status updated"),
            Ok(false) => warn!(device = %device, "No sensor reading to update"),
            Err(e) => warn!(device = %device, error = %e, "Failed to update latest reading status"),
        }
    }
}

fn already_terminal(command: &DeviceCommand) -> Error {
    Error::conflict(format!(
        "command {} is already {}",
        command.id, command.status
    ))
}

#[async_trait]
impl CommandSource for CommandQueue {
    async fn next_batch(&self) -> Result<Vec<PendingCommand>> {
        self.list_pending().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
