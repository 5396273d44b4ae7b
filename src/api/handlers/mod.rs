pub mod auth;
pub mod chat;
pub mod commands;
pub mod data;
pub mod reports;

use axum::Json;
use serde_json::{json, Value};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{
    auth::{DEVICE_KEY_HEADER, SERVICE_KEY_HEADER},
    dto::{
        ChatRequest, ChatResponse, LoginRequest, LoginResponse, RegisterRequest,
        RegisterResponse, SendCommandRequest, SendCommandResponse, UpdateCommandRequest,
        UpdateCommandResponse,
    },
};
use crate::{
    commands::{CommandStatus, Device, DeviceCommand, LatestStatus, PendingCommand, SwitchState},
    reports::{
        CommandCounts, CommandGroup, CommandGroupBy, CommandReport, DateRange, EnergyUsageDay,
        EnergyUsageReport, SensorStatsDay, SensorStatsReport, WaterUsageDay, WaterUsageReport,
    },
    telemetry::{
        payload::{IngestPayload, ResourcePayload},
        IngestReceipt, SensorReading,
    },
    users::Role,
};

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document (used in api/mod.rs)
// ---------------------------------------------------------------------------

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "device_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(DEVICE_KEY_HEADER))),
        );
        components.add_security_scheme(
            "service_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(SERVICE_KEY_HEADER))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login,
        auth::register,
        commands::send_command,
        commands::command_status,
        commands::pending_commands,
        commands::update_command,
        data::ingest,
        data::latest,
        data::history,
        reports::command_report,
        reports::water_usage,
        reports::energy_usage,
        reports::sensor_stats,
        chat::chatbot,
        health,
    ),
    components(schemas(
        LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, Role,
        SendCommandRequest, SendCommandResponse, UpdateCommandRequest, UpdateCommandResponse,
        Device, SwitchState, CommandStatus, DeviceCommand, LatestStatus, PendingCommand,
        IngestPayload, ResourcePayload, IngestReceipt, SensorReading,
        DateRange, CommandGroupBy, CommandCounts, CommandGroup, CommandReport,
        WaterUsageDay, WaterUsageReport, EnergyUsageDay, EnergyUsageReport,
        SensorStatsDay, SensorStatsReport,
        ChatRequest, ChatResponse,
    )),
    modifiers(&SecuritySchemes),
    tags(
        (name = "auth",     description = "Login and account registration"),
        (name = "commands", description = "Actuator command queue"),
        (name = "data",     description = "Telemetry ingestion and reads"),
        (name = "reports",  description = "Aggregated reports (admin only)"),
        (name = "chat",     description = "Greenhouse assistant"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "Greenhouse Control API",
        version = "0.1.0",
        description = "REST API for greenhouse telemetry, actuator commands and reports"
    )
)]
pub struct ApiDoc;
