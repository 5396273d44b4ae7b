use std::time::Duration;

use anyhow::{Context, Result};

use crate::users::Role;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub auth: AuthConfig,
    /// Device id stamped on readings that do not carry one.
    pub default_device_id: String,
    /// Soil moisture (%) below which the critical alert fires.
    pub moisture_alert_threshold: f64,
    /// Flat draw (kWh) added to the energy report for every active day.
    pub fixed_daily_energy_kwh: f64,
    /// Optional HTTP relay for critical alerts. Alerts are only logged when unset.
    pub alert_webhook_url: Option<String>,
    pub llm: LlmConfig,
}

/// Secrets checked by the request extractors in `api::auth`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Shared secret sent by the field device in `x-api-key`.
    pub device_api_key: String,
    /// Shared secret sent by automation in `x-service-api-key`.
    pub service_api_key: String,
    pub service_user_id: i64,
    pub service_user_role: Role,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `None` disables the chat gateway's upstream call.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: optional("DB_MAX_CONNECTIONS", "10")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            auth: AuthConfig {
                jwt_secret: required("JWT_SECRET")?,
                device_api_key: required("DEVICE_API_KEY")?,
                service_api_key: required("SERVICE_API_KEY")?,
                service_user_id: optional("SERVICE_USER_ID", "0")
                    .parse()
                    .context("SERVICE_USER_ID must be an integer")?,
                service_user_role: optional("SERVICE_USER_ROLE", "user")
                    .parse()
                    .context("SERVICE_USER_ROLE must be 'admin' or 'user'")?,
            },
            default_device_id: optional("DEFAULT_DEVICE_ID", "greenhouse-1"),
            moisture_alert_threshold: parse_percent(&optional("MOISTURE_ALERT_THRESHOLD", "20"))
                .context("MOISTURE_ALERT_THRESHOLD")?,
            fixed_daily_energy_kwh: optional("FIXED_DAILY_ENERGY_KWH", "0.24")
                .parse()
                .context("FIXED_DAILY_ENERGY_KWH must be a number")?,
            alert_webhook_url: non_empty("ALERT_WEBHOOK_URL"),
            llm: LlmConfig {
                api_key: non_empty("LLM_API_KEY"),
                base_url: optional("LLM_BASE_URL", "https://api.openai.com/v1"),
                model: optional("LLM_MODEL", "gpt-4o-mini"),
                timeout: Duration::from_secs(
                    optional("LLM_TIMEOUT_SECS", "30")
                        .parse()
                        .context("LLM_TIMEOUT_SECS must be a positive integer")?,
                ),
            },
        })
    }
}

/// Parse a percentage in `0..=100`.
fn parse_percent(raw: &str) -> Result<f64> {
    let v: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("expected a number, got {raw:?}"))?;
    anyhow::ensure!((0.0..=100.0).contains(&v), "percentage out of range: {v}");
    Ok(v)
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
