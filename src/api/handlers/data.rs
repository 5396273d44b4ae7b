use axum::{extract::State, http::StatusCode, Json};

use crate::{
    api::{
        auth::{AuthUser, DeviceKey},
        dto::HistoryParams,
        errors::{ApiJson, ApiQuery, AppError},
        AppState,
    },
    telemetry::{payload::IngestPayload, IngestReceipt, SensorReading},
};

const DEFAULT_HISTORY_HOURS: u32 = 24;

/// Telemetry batch from the field device.
#[utoipa::path(
    post,
    path = "/api/data/ingest",
    request_body = IngestPayload,
    responses(
        (status = 202, description = "Batch stored", body = IngestReceipt),
        (status = 400, description = "Missing or malformed fields"),
        (status = 401, description = "Missing or invalid device key"),
        (status = 409, description = "Duplicate resource_id, nothing stored"),
    ),
    security(("device_key" = [])),
    tag = "data"
)]
pub async fn ingest(
    State(state): State<AppState>,
    _device: DeviceKey,
    ApiJson(payload): ApiJson<IngestPayload>,
) -> Result<(StatusCode, Json<IngestReceipt>), AppError> {
    let receipt = state.ingest.ingest(payload).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Newest sensor reading, or `null` before the first ingest.
#[utoipa::path(
    get,
    path = "/api/data/latest",
    responses(
        (status = 200, description = "Latest reading, `null` when none exists", body = SensorReading),
        (status = 401, description = "Missing or invalid credentials"),
    ),
    security(("bearer" = []), ("service_key" = [])),
    tag = "data"
)]
pub async fn latest(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Option<SensorReading>>, AppError> {
    Ok(Json(state.ingest.latest().await?))
}

/// Readings from the last `hours`, oldest first.
#[utoipa::path(
    get,
    path = "/api/data/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Readings in the window", body = Vec<SensorReading>),
        (status = 400, description = "hours outside 1..=168"),
        (status = 401, description = "Missing or invalid credentials"),
    ),
    security(("bearer" = []), ("service_key" = [])),
    tag = "data"
)]
pub async fn history(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<Json<Vec<SensorReading>>, AppError> {
    let hours = params.hours.unwrap_or(DEFAULT_HISTORY_HOURS);
    Ok(Json(state.ingest.history(hours).await?))
}
