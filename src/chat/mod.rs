pub mod classifier;
pub mod client;

use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    telemetry::{SensorReading, TelemetryStore},
};

use self::{
    classifier::{Classification, Classifier, Intent},
    client::{CompletionClient, CompletionError},
};

pub const REFUSAL: &str = "Sorry, I can only help with questions about your greenhouse \
    conditions, crops and irrigation. I can't control devices or advise on chemicals, \
    finances, medical matters or forecasts.";
pub const NOT_CONFIGURED: &str =
    "The assistant is not configured yet. Please ask an administrator to set it up.";
pub const BAD_CREDENTIALS: &str =
    "The assistant is misconfigured (invalid API credentials). Please contact an administrator.";
pub const BUSY: &str = "The assistant is busy right now. Please try again in a moment.";
pub const UNAVAILABLE: &str = "The assistant is temporarily unavailable. Please try again later.";

const MAX_QUESTION_CHARS: usize = 1_000;
const HISTORY_HOURS: i64 = 24;
const HISTORY_SAMPLES: u32 = 48;

#[derive(Clone)]
pub struct ChatGateway {
    classifier: Arc<Classifier>,
    telemetry: Arc<dyn TelemetryStore>,
    llm: Option<Arc<dyn CompletionClient>>,
}

impl ChatGateway {
    pub fn new(
        classifier: Classifier,
        telemetry: Arc<dyn TelemetryStore>,
        llm: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            telemetry,
            llm,
        }
    }

    /// Answers `question` as HTML. Upstream failures become fixed messages;
    /// only input validation and store errors are returned as `Err`.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::invalid("question is required"));
        }
        if question.chars().count() > MAX_QUESTION_CHARS {
            return Err(Error::invalid(format!(
                "question must be at most {MAX_QUESTION_CHARS} characters"
            )));
        }

        let intent = match self.classifier.classify(question) {
            Classification::Blocked(topic) => {
                info!(topic = topic.label(), "Chat question blocked");
                return Ok(to_html(REFUSAL));
            }
            Classification::Allowed(intent) => intent,
        };

        let Some(llm) = &self.llm else {
            warn!("Chat question received but no LLM API key is configured");
            return Ok(to_html(NOT_CONFIGURED));
        };

        let slice = self.telemetry_slice(intent).await?;
        let system = system_prompt(intent, &slice);

        let answer = match llm.complete(&system, question).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, intent = ?intent, "Chat completion failed");
                fallback_message(&e).to_owned()
            }
        };
        Ok(to_html(&answer))
    }

    async fn telemetry_slice(&self, intent: Intent) -> Result<Vec<SensorReading>> {
        match intent {
            Intent::General => Ok(Vec::new()),
            Intent::History => {
                let since = Utc::now() - Duration::hours(HISTORY_HOURS);
                self.telemetry.history(since, HISTORY_SAMPLES).await
            }
            Intent::CropSuitability
            | Intent::IrrigationSchedule
            | Intent::SoilCondition
            | Intent::SensorData => Ok(self.telemetry.latest().await?.into_iter().collect()),
        }
    }
}

pub fn fallback_message(e: &CompletionError) -> &'static str {
    match e {
        CompletionError::Status(StatusCode::UNAUTHORIZED) => BAD_CREDENTIALS,
        CompletionError::Status(StatusCode::TOO_MANY_REQUESTS) => BUSY,
        _ => UNAVAILABLE,
    }
}

fn system_prompt(intent: Intent, slice: &[SensorReading]) -> String {
    let mut prompt = String::from(
        "You are the assistant of a smart greenhouse monitoring system. \
         Answer only questions about greenhouse conditions, crops, soil and irrigation. \
         Never give instructions to operate devices, never recommend chemicals, \
         and never give financial, medical or forecasting advice. \
         Keep answers short and practical. Soil moisture values are percentages, \
         temperature is in degrees Celsius and humidity in percent.",
    );
    prompt.push_str(&format!("\nQuestion category: {}.", intent_label(intent)));

    if slice.is_empty() {
        if intent != Intent::General {
            prompt.push_str("\nNo sensor data is available; say so if it is needed.");
        }
    } else {
        let data = json!(slice);
        prompt.push_str("\nSensor data (JSON, oldest first):\n");
        prompt.push_str(&data.to_string());
    }
    prompt
}

fn intent_label(intent: Intent) -> &'static str {
    match intent {
        Intent::History => "historical sensor trends",
        Intent::CropSuitability => "crop suitability",
        Intent::IrrigationSchedule => "irrigation schedule",
        Intent::SoilCondition => "soil condition",
        Intent::SensorData => "current sensor data",
        Intent::General => "general greenhouse question",
    }
}

/// Escapes `text` and applies the little formatting the UI understands:
/// `**bold**` and line breaks.
pub fn to_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;");

    let mut out = String::with_capacity(escaped.len());
    for (i, part) in escaped.split("**").enumerate() {
        // Odd segments sit between a pair of markers.
        if i % 2 == 1 {
            out.push_str("<strong>");
            out.push_str(part);
            out.push_str("</strong>");
        } else {
            out.push_str(part);
        }
    }
    // An unpaired marker would leave an open tag.
    if escaped.matches("**").count() % 2 == 1 {
        out = escaped;
    }
    out.replace("\r\n", "\n").replace('\n', "<br>")
}
