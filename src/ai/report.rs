//! Insight documents returned by the completion API
//!
//! The analyzer hands back the model's JSON untouched as an
//! [`InsightDocument`]. Consumers that need typed access build an
//! [`InsightReport`] from it: the tolerant view fills in anything the model
//! left out, while [`InsightReport::validate`] is the strict check used when
//! schema enforcement is switched on.

use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Top-level keys the prompt asks the model to produce
pub const REPORT_KEYS: [&str; 5] = [
    "p0_issues",
    "product_gaps",
    "sentiment",
    "quick_wins",
    "key_themes",
];

const LEVELS: [&str; 3] = ["high", "medium", "low"];
const SENTIMENT_LABELS: [&str; 3] = ["positive", "neutral", "negative"];

/// Parsed completion, exactly as the model produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsightDocument(Value);

impl InsightDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Build the tolerant typed view of this document
    pub fn report(&self) -> InsightReport {
        InsightReport::from_document(self)
    }
}

/// Critical, customer-blocking defect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct P0Issue {
    pub title: String,
    pub description: String,
    pub urgency: String,
}

/// Capability customers ask for that the product lacks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductGap {
    pub title: String,
    pub description: String,
    /// "high", "medium" or "low"
    pub frequency: String,
}

/// Low-effort, high-impact improvement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickWin {
    pub title: String,
    /// "high", "medium" or "low"
    pub impact: String,
}

/// Aggregate sentiment for the submitted feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sentiment {
    /// -100 (very negative) to +100 (very positive)
    #[serde(deserialize_with = "lenient_score")]
    pub score: i64,
    pub label: String,
    pub summary: String,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            score: 0,
            label: "neutral".to_string(),
            summary: String::new(),
        }
    }
}

impl Sentiment {
    /// Position of the score on a 0-100 gauge, clamped for display
    pub fn gauge_percent(&self) -> u8 {
        ((self.score.clamp(-100, 100) + 100) / 2) as u8
    }
}

/// Typed view over an insight document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub p0_issues: Vec<P0Issue>,
    pub product_gaps: Vec<ProductGap>,
    pub sentiment: Sentiment,
    pub quick_wins: Vec<QuickWin>,
    pub key_themes: Vec<String>,
}

/// Ways a document can deviate from the requested report shape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaViolations(Vec<String>);

impl SchemaViolations {
    fn push(&mut self, violation: String) {
        self.0.push(violation);
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

impl std::error::Error for SchemaViolations {}

impl InsightReport {
    /// Build a report, defaulting whatever the document leaves out
    ///
    /// Each top-level key is read on its own, so one mistyped category does
    /// not blank out the rest of the report.
    pub fn from_document(document: &InsightDocument) -> Self {
        let Some(object) = document.as_value().as_object() else {
            warn!("Insight document is not a JSON object; rendering an empty report");
            return Self::default();
        };

        Self {
            p0_issues: field(object, "p0_issues"),
            product_gaps: field(object, "product_gaps"),
            sentiment: field(object, "sentiment"),
            quick_wins: field(object, "quick_wins"),
            key_themes: field(object, "key_themes"),
        }
    }

    /// Check a document against the requested shape
    ///
    /// All five keys must be present, categories must be arrays of objects
    /// with string fields, enumerated fields must use the documented values and
    /// the sentiment score must be an integer in [-100, 100].
    pub fn validate(value: &Value) -> Result<Self, SchemaViolations> {
        let mut violations = SchemaViolations::default();

        let Some(object) = value.as_object() else {
            violations.push("response is not a JSON object".to_string());
            return Err(violations);
        };

        for key in REPORT_KEYS {
            if !object.contains_key(key) {
                violations.push(format!("missing key '{}'", key));
            }
        }

        check_items(object, "p0_issues", &mut violations, |item, at, v| {
            require_str(item, "title", at, v);
            require_str(item, "description", at, v);
            if let Some(urgency) = require_str(item, "urgency", at, v) {
                if urgency != "critical" {
                    v.push(format!("{}.urgency must be \"critical\", got {:?}", at, urgency));
                }
            }
        });

        check_items(object, "product_gaps", &mut violations, |item, at, v| {
            require_str(item, "title", at, v);
            require_str(item, "description", at, v);
            require_one_of(item, "frequency", &LEVELS, at, v);
        });

        check_items(object, "quick_wins", &mut violations, |item, at, v| {
            require_str(item, "title", at, v);
            require_one_of(item, "impact", &LEVELS, at, v);
        });

        match object.get("key_themes") {
            Some(Value::Array(themes)) => {
                for (i, theme) in themes.iter().enumerate() {
                    if !theme.is_string() {
                        violations.push(format!("key_themes[{}] must be a string", i));
                    }
                }
            }
            Some(_) => violations.push("key_themes must be an array".to_string()),
            None => {}
        }

        match object.get("sentiment") {
            Some(Value::Object(sentiment)) => {
                match sentiment.get("score").and_then(Value::as_i64) {
                    Some(score) if (-100..=100).contains(&score) => {}
                    Some(score) => violations.push(format!(
                        "sentiment.score must be within [-100, 100], got {}",
                        score
                    )),
                    None => violations.push("sentiment.score must be an integer".to_string()),
                }
                require_one_of(sentiment, "label", &SENTIMENT_LABELS, "sentiment", &mut violations);
                require_str(sentiment, "summary", "sentiment", &mut violations);
            }
            Some(_) => violations.push("sentiment must be an object".to_string()),
            None => {}
        }

        if violations.is_empty() {
            Ok(Self::from_document(&InsightDocument::new(value.clone())))
        } else {
            Err(violations)
        }
    }
}

fn field<T>(object: &Map<String, Value>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match object.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!("Ignoring malformed '{}' in insight document: {}", key, e);
            T::default()
        }),
    }
}

fn check_items<F>(object: &Map<String, Value>, key: &str, violations: &mut SchemaViolations, check: F)
where
    F: Fn(&Map<String, Value>, &str, &mut SchemaViolations),
{
    match object.get(key) {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let at = format!("{}[{}]", key, i);
                match item.as_object() {
                    Some(item) => check(item, &at, violations),
                    None => violations.push(format!("{} must be an object", at)),
                }
            }
        }
        Some(_) => violations.push(format!("{} must be an array", key)),
        None => {}
    }
}

fn require_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    at: &str,
    violations: &mut SchemaViolations,
) -> Option<&'a str> {
    let value = object.get(key).and_then(Value::as_str);
    if value.is_none() {
        violations.push(format!("{}.{} must be a string", at, key));
    }
    value
}

fn require_one_of(
    object: &Map<String, Value>,
    key: &str,
    allowed: &[&str],
    at: &str,
    violations: &mut SchemaViolations,
) {
    if let Some(value) = require_str(object, key, at, violations) {
        if !allowed.contains(&value) {
            violations.push(format!(
                "{}.{} must be one of {}, got {:?}",
                at,
                key,
                allowed.join("/"),
                value
            ));
        }
    }
}

// Models occasionally emit 42.0 or "42" for the score.
fn lenient_score<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let score = match &value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().trim_start_matches('+').parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    };
    score.ok_or_else(|| serde::de::Error::custom(format!("invalid sentiment score: {}", value)))
}
