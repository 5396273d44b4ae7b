//! Critical-moisture alerts.
//!
//! Delivery is best-effort: callers spawn `Notifier::critical_moisture` after
//! the triggering write has committed and only log its failures.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoistureAlert {
    pub sensor_data_id: i64,
    pub device_id: String,
    pub recorded_at: DateTime<Utc>,
    /// Soil channels 1..=3, in percent.
    pub soil_moisture: [f64; 3],
    pub threshold: f64,
}

impl MoistureAlert {
    /// 1-based channels whose reading is below the threshold.
    pub fn critical_channels(&self) -> Vec<usize> {
        self.soil_moisture
            .iter()
            .enumerate()
            .filter(|(_, v)| **v < self.threshold)
            .map(|(i, _)| i + 1)
            .collect()
    }

    pub fn subject(&self) -> String {
        format!("Critical soil moisture on {}", self.device_id)
    }

    pub fn body(&self) -> String {
        let channels = self
            .critical_channels()
            .iter()
            .map(|c| format!("soil{c} = {:.1}%", self.soil_moisture[c - 1]))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Reading #{} at {} is below {:.0}%: {channels}. Check irrigation.",
            self.sensor_data_id,
            self.recorded_at.to_rfc3339(),
            self.threshold,
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn critical_moisture(&self, alert: &MoistureAlert) -> Result<()>;
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn critical_moisture(&self, alert: &MoistureAlert) -> Result<()> {
        warn!(
            sensor_data_id = alert.sensor_data_id,
            device_id = %alert.device_id,
            channels = ?alert.critical_channels(),
            "{}",
            alert.body()
        );
        Ok(())
    }
}

/// Posts alerts as JSON to a mail relay or chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    text: String,
    alert: &'a MoistureAlert,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn critical_moisture(&self, alert: &MoistureAlert) -> Result<()> {
        let payload = WebhookPayload {
            subject: alert.subject(),
            text: alert.body(),
            alert,
        };

        self.http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("alert webhook request failed")?
            .error_for_status()
            .context("alert webhook returned error status")?;

        info!(sensor_data_id = alert.sensor_data_id, "Critical moisture alert delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(soil: [f64; 3]) -> MoistureAlert {
        MoistureAlert {
            sensor_data_id: 12,
            device_id: "gh-1".into(),
            recorded_at: Utc::now(),
            soil_moisture: soil,
            threshold: 20.0,
        }
    }

    #[test]
    fn critical_channels_are_one_based() {
        assert_eq!(alert([15.0, 40.0, 19.9]).critical_channels(), vec![1, 3]);
        assert!(alert([20.0, 20.0, 20.0]).critical_channels().is_empty());
    }

    #[test]
    fn body_lists_only_critical_channels() {
        let body = alert([15.0, 40.0, 50.0]).body();
        assert!(body.contains("soil1 = 15.0%"));
        assert!(!body.contains("soil2"));
        assert!(body.starts_with("Reading #12"));
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        LogNotifier.critical_moisture(&alert([1.0, 2.0, 3.0])).await.unwrap();
    }
}
