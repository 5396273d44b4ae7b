//! Keyword classification of chat questions.
//!
//! Rules are evaluated in order and the first match wins. Block rules always
//! run before intent rules.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    History,
    CropSuitability,
    IrrigationSchedule,
    SoilCondition,
    SensorData,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedTopic {
    DeviceControl,
    Chemicals,
    FinancialAdvice,
    MedicalAdvice,
    Forecast,
}

impl BlockedTopic {
    pub fn label(self) -> &'static str {
        match self {
            BlockedTopic::DeviceControl => "device control",
            BlockedTopic::Chemicals => "chemicals",
            BlockedTopic::FinancialAdvice => "financial advice",
            BlockedTopic::MedicalAdvice => "medical advice",
            BlockedTopic::Forecast => "forecasts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Allowed(Intent),
    Blocked(BlockedTopic),
}

#[derive(Debug, Clone)]
pub struct Rule<C> {
    pattern: Regex,
    /// Suppresses the rule when it also matches.
    unless: Option<Regex>,
    category: C,
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl<C: Copy> Rule<C> {
    /// Case-insensitive rule.
    pub fn new(pattern: &str, category: C) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: case_insensitive(pattern)?,
            unless: None,
            category,
        })
    }

    /// Skips this rule for questions that also match `pattern`.
    pub fn unless(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.unless = Some(case_insensitive(pattern)?);
        Ok(self)
    }

    pub fn matches(&self, text: &str) -> Option<C> {
        let exempt = self.unless.as_ref().is_some_and(|u| u.is_match(text));
        (!exempt && self.pattern.is_match(text)).then_some(self.category)
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    blocklist: Vec<Rule<BlockedTopic>>,
    intents: Vec<Rule<Intent>>,
}

/// Words that put a money question back in growing territory.
const CROP_CONTEXT: &str = r"\b(crops?|plants?|grow\w*|soil|seeds?|seedlings?|harvest\w*|yields?|variet(y|ies))\b";

/// `(pattern, unless, topic)`.
const BLOCK_RULES: &[(&str, Option<&str>, BlockedTopic)] = &[
    (
        r"\b(turn|switch|power)\s+(the\s+)?(on|off)\b|\b(turn|switch)\s+(\w+\s+){1,3}(on|off)\b|\b(start|stop|open|close|activate|deactivate|toggle|run)\s+(the\s+)?(pump|valve|irrigation|sprinkler)s?\b|\b(should|can|could|will|must|let|make)\s+the\s+(pump|valve|sprinkler)s?\s+run\b",
        None,
        BlockedTopic::DeviceControl,
    ),
    (
        r"\b(pesticides?|herbicides?|fungicides?|insecticides?|chemicals?|poisons?)\b",
        None,
        BlockedTopic::Chemicals,
    ),
    (
        r"\b(invest\w*|stocks?|shares|loans?|mortgages?|taxes|revenue|interest\s+rates?)\b",
        None,
        BlockedTopic::FinancialAdvice,
    ),
    (
        r"\b(price|prices|pricing|profits?|market\s+value|sell\s+for)\b",
        Some(CROP_CONTEXT),
        BlockedTopic::FinancialAdvice,
    ),
    (
        r"\b(medical|medicine|medications?|doctors?|physicians?|hospitals?|prescriptions?|my\s+(health|body)|human\s+(health|illness|disease)|i\s+feel\s+(sick|ill|unwell))\b",
        None,
        BlockedTopic::MedicalAdvice,
    ),
    (
        r"\b(forecast\w*|predict\w*|will\s+it\s+rain|weather\s+(tomorrow|next))\b",
        None,
        BlockedTopic::Forecast,
    ),
];

const INTENT_RULES: &[(&str, Intent)] = &[
    (
        r"\b(history|historical|past|previous|yesterday|last\s+(\d+\s+)?(hours?|days?|week|month)|trends?)\b",
        Intent::History,
    ),
    (
        r"\b(crops?|suitable|suitability|what\s+(can|should)\s+i\s+(grow|plant)|grow\s+well)\b",
        Intent::CropSuitability,
    ),
    (
        r"\b(irrigat\w*|watering|water\s+schedule|when\s+(should|to)\s+(i\s+)?water|water\s+(the\s+)?(beds?|plants?|garden|seedlings?)|how\s+often)\b",
        Intent::IrrigationSchedule,
    ),
    (r"\b(soil|moisture|dry|wet)\b", Intent::SoilCondition),
    (
        r"\b(temperature|humidity|sensors?|readings?|water\s+level|tank|current(ly)?|right\s+now)\b",
        Intent::SensorData,
    ),
];

impl Classifier {
    pub fn new(blocklist: Vec<Rule<BlockedTopic>>, intents: Vec<Rule<Intent>>) -> Self {
        Self { blocklist, intents }
    }

    /// The rule set the service ships with.
    pub fn standard() -> Result<Self, regex::Error> {
        let blocklist = BLOCK_RULES
            .iter()
            .map(|(p, unless, c)| match unless {
                Some(u) => Rule::new(p, *c)?.unless(u),
                None => Rule::new(p, *c),
            })
            .collect::<Result<_, _>>()?;
        let intents = INTENT_RULES
            .iter()
            .map(|(p, c)| Rule::new(p, *c))
            .collect::<Result<_, _>>()?;
        Ok(Self::new(blocklist, intents))
    }

    pub fn classify(&self, question: &str) -> Classification {
        if let Some(topic) = self.blocklist.iter().find_map(|r| r.matches(question)) {
            return Classification::Blocked(topic);
        }
        let intent = self
            .intents
            .iter()
            .find_map(|r| r.matches(question))
            .unwrap_or(Intent::General);
        Classification::Allowed(intent)
    }
}
