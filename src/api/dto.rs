use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    commands::{CommandStatus, Device, DeviceCommand, SwitchState},
    users::Role,
};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Issue a 30-day token instead of a 1-day one.
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub user_role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Defaults to `user`.
    pub role: Option<Role>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: i64,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCommandRequest {
    /// `pump` or `valve`.
    pub device: String,
    /// `ON` or `OFF`.
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendCommandResponse {
    pub command_id: i64,
    pub device: Device,
    pub desired_state: SwitchState,
    pub status: CommandStatus,
}

/// Execution report sent by the device.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCommandRequest {
    pub command_id: i64,
    /// `SUCCESS` or `FAILED`.
    pub status: String,
    /// Required when `status` is `SUCCESS`.
    pub actual_state: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateCommandResponse {
    pub message: String,
    pub command: DeviceCommand,
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Window size, 1 to 168. Defaults to 24.
    pub hours: Option<u32>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// HTML fragment.
    pub response: String,
}
