use axum::{extract::State, http::StatusCode, Json};

use crate::{
    api::{
        auth::{AuthUser, DeviceKey},
        dto::{SendCommandRequest, SendCommandResponse, UpdateCommandRequest, UpdateCommandResponse},
        errors::{ApiJson, AppError},
        AppState,
    },
    commands::{CommandResult, CommandStatus, Device, LatestStatus, PendingCommand, SwitchState},
};

/// Queue a pump or valve command for the device to pick up.
#[utoipa::path(
    post,
    path = "/api/commands/send",
    request_body = SendCommandRequest,
    responses(
        (status = 201, description = "Command queued", body = SendCommandResponse),
        (status = 400, description = "Unknown device or state"),
        (status = 401, description = "Missing or invalid credentials"),
    ),
    security(("bearer" = []), ("service_key" = [])),
    tag = "commands"
)]
pub async fn send_command(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<SendCommandRequest>,
) -> Result<(StatusCode, Json<SendCommandResponse>), AppError> {
    let device: Device = req.device.trim().to_ascii_lowercase().parse()?;
    let desired: SwitchState = req.state.trim().to_ascii_uppercase().parse()?;

    let command_id = state.queue.submit(device, desired, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendCommandResponse {
            command_id,
            device,
            desired_state: desired,
            status: CommandStatus::Pending,
        }),
    ))
}

/// Newest command per device.
#[utoipa::path(
    get,
    path = "/api/commands/status",
    responses(
        (status = 200, description = "Latest command per device", body = LatestStatus),
        (status = 401, description = "Missing or invalid credentials"),
    ),
    security(("bearer" = []), ("service_key" = [])),
    tag = "commands"
)]
pub async fn command_status(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<LatestStatus>, AppError> {
    Ok(Json(state.queue.latest_status().await?))
}

/// Pending commands, oldest first. Polled by the field device.
#[utoipa::path(
    get,
    path = "/api/commands/pending",
    responses(
        (status = 200, description = "Pending commands", body = Vec<PendingCommand>),
        (status = 401, description = "Missing or invalid device key"),
    ),
    security(("device_key" = [])),
    tag = "commands"
)]
pub async fn pending_commands(
    State(state): State<AppState>,
    _device: DeviceKey,
) -> Result<Json<Vec<PendingCommand>>, AppError> {
    Ok(Json(state.source.next_batch().await?))
}

/// Execution report from the field device.
#[utoipa::path(
    post,
    path = "/api/commands/update",
    request_body = UpdateCommandRequest,
    responses(
        (status = 200, description = "Command completed", body = UpdateCommandResponse),
        (status = 400, description = "Invalid status or missing actual_state"),
        (status = 401, description = "Missing or invalid device key"),
        (status = 404, description = "Unknown command"),
        (status = 409, description = "Command already completed"),
    ),
    security(("device_key" = [])),
    tag = "commands"
)]
pub async fn update_command(
    State(state): State<AppState>,
    _device: DeviceKey,
    ApiJson(req): ApiJson<UpdateCommandRequest>,
) -> Result<Json<UpdateCommandResponse>, AppError> {
    let status: CommandStatus = req.status.trim().to_ascii_uppercase().parse()?;
    let actual = req
        .actual_state
        .as_deref()
        .map(|s| s.trim().to_ascii_uppercase().parse::<SwitchState>())
        .transpose()?;
    let result = CommandResult::new(status, actual)?;

    let command = state.queue.report_result(req.command_id, result).await?;
    Ok(Json(UpdateCommandResponse {
        message: format!("command {} marked {}", command.id, command.status),
        command,
    }))
}
