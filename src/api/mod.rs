pub mod auth;
pub mod dto;
pub mod errors;
pub mod handlers;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    chat::ChatGateway,
    commands::{CommandQueue, CommandSource},
    config::AuthConfig,
    reports::ReportService,
    telemetry::IngestService,
    users::UserService,
};

use handlers::ApiDoc;

/// Everything the handlers need. Built once in `main`.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub users: UserService,
    pub queue: CommandQueue,
    /// Delivery side of the queue; `queue` itself unless replaced.
    pub source: Arc<dyn CommandSource>,
    pub ingest: IngestService,
    pub reports: ReportService,
    pub chat: ChatGateway,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/login", post(handlers::auth::login))
        .route("/api/register", post(handlers::auth::register))
        .route("/api/commands/send", post(handlers::commands::send_command))
        .route("/api/commands/status", get(handlers::commands::command_status))
        .route("/api/commands/pending", get(handlers::commands::pending_commands))
        .route("/api/commands/update", post(handlers::commands::update_command))
        .route("/api/data/ingest", post(handlers::data::ingest))
        .route("/api/data/latest", get(handlers::data::latest))
        .route("/api/data/history", get(handlers::data::history))
        .route("/api/reports/commands", get(handlers::reports::command_report))
        .route("/api/reports/water-usage", get(handlers::reports::water_usage))
        .route("/api/reports/energy-usage", get(handlers::reports::energy_usage))
        .route("/api/reports/sensor-stats", get(handlers::reports::sensor_stats))
        .route("/api/chatbot", post(handlers::chat::chatbot))
        .with_state(state)
        .split_for_parts();

    router.route("/health", get(handlers::health)).route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    )
}
