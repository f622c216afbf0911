use crate::ai::backends::{CompletionBackend, CompletionRequest};
use crate::ai::report::{InsightDocument, InsightReport};
use crate::config::AiConfig;
use crate::error::AnalysisError;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Settings the analyzer needs from configuration
///
/// Built once at startup and handed to [`FeedbackAnalyzer::new`], so the
/// analysis path never reads the environment itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub strict_schema: bool,
}

impl AnalyzerSettings {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            api_key: config.credential().map(str::to_string),
            model: config.model.clone(),
            strict_schema: config.strict_schema,
        }
    }

    /// The credential, treating blank values as absent
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl fmt::Debug for AnalyzerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("strict_schema", &self.strict_schema)
            .finish()
    }
}

/// Category of a failed analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The completion API credential is missing
    Config,
    /// The completion was not valid JSON (or not the expected shape in strict mode)
    Parse,
    /// Any other failure of the completion call
    Api,
}

/// A failed analysis, ready to show to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisFailure {
    pub kind: FailureKind,
    pub message: String,
    /// The completion text that could not be parsed, kept for diagnostics
    pub raw_response: Option<String>,
}

/// Result of analyzing one piece of feedback
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Success(InsightDocument),
    Failure(AnalysisFailure),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success(_))
    }

    pub fn document(&self) -> Option<&InsightDocument> {
        match self {
            AnalysisOutcome::Success(document) => Some(document),
            AnalysisOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AnalysisFailure> {
        match self {
            AnalysisOutcome::Success(_) => None,
            AnalysisOutcome::Failure(failure) => Some(failure),
        }
    }
}

impl From<AnalysisError> for AnalysisFailure {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::MissingCredential => AnalysisFailure {
                kind: FailureKind::Config,
                message: err.to_string(),
                raw_response: None,
            },
            AnalysisError::MalformedJson { source, raw } => AnalysisFailure {
                kind: FailureKind::Parse,
                message: format!("Failed to parse AI response: {}", source),
                raw_response: Some(raw),
            },
            AnalysisError::SchemaMismatch { violations, raw } => AnalysisFailure {
                kind: FailureKind::Parse,
                message: format!(
                    "AI response did not match the expected shape: {}",
                    violations
                ),
                raw_response: Some(raw),
            },
            other => AnalysisFailure {
                kind: FailureKind::Api,
                message: format!("API Error: {}", other),
                raw_response: None,
            },
        }
    }
}

/// Voice-of-customer feedback analyzer
///
/// Turns free-text feedback into an insight document by asking a completion
/// backend for a JSON report. Every failure is converted into
/// [`AnalysisOutcome::Failure`]; nothing propagates past [`analyze`].
///
/// [`analyze`]: FeedbackAnalyzer::analyze
pub struct FeedbackAnalyzer {
    backend: Arc<dyn CompletionBackend>,
    settings: AnalyzerSettings,
}

impl FeedbackAnalyzer {
    /// Create an analyzer with a specific completion backend
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: AnalyzerSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Analyze one piece of customer feedback
    ///
    /// The caller is responsible for rejecting empty input. With no credential
    /// configured the backend is never contacted. The completion is called
    /// once, with no retry.
    pub async fn analyze(&self, feedback_text: &str) -> AnalysisOutcome {
        info!(
            "Starting feedback analysis: {} chars, model={}",
            feedback_text.chars().count(),
            self.settings.model
        );
        if feedback_text.trim().is_empty() {
            warn!("Analyzer called with empty feedback; callers should reject it first");
        }

        let start_time = Instant::now();
        let result = self.try_analyze(feedback_text).await;
        let duration = start_time.elapsed();

        match result {
            Ok(document) => {
                info!("Feedback analysis completed in {:?}", duration);
                if let Some(object) = document.as_value().as_object() {
                    debug!(
                        "Insight document keys: {:?}",
                        object.keys().collect::<Vec<_>>()
                    );
                }
                AnalysisOutcome::Success(document)
            }
            Err(e) => {
                error!("Feedback analysis failed after {:?}: {}", duration, e);
                AnalysisOutcome::Failure(AnalysisFailure::from(e))
            }
        }
    }

    async fn try_analyze(&self, feedback_text: &str) -> Result<InsightDocument, AnalysisError> {
        let prompt = Self::format_prompt(feedback_text);

        let api_key = self
            .settings
            .credential()
            .ok_or(AnalysisError::MissingCredential)?;

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            prompt,
            api_key: api_key.to_string(),
        };

        let completion = self.backend.complete(&request).await?;
        debug!("Received completion of {} bytes", completion.len());

        Self::parse_completion(&completion, self.settings.strict_schema)
    }

    /// Parse completion text into an insight document
    ///
    /// Surrounding whitespace and an optional code fence are removed first.
    /// With `strict` set the document must also match the report shape.
    pub fn parse_completion(completion: &str, strict: bool) -> Result<InsightDocument, AnalysisError> {
        let body = Self::strip_code_fence(completion);

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(source) => return Err(AnalysisError::MalformedJson { source, raw: body }),
        };

        if strict {
            if let Err(violations) = InsightReport::validate(&value) {
                return Err(AnalysisError::SchemaMismatch {
                    violations: violations.to_string(),
                    raw: body,
                });
            }
        }

        Ok(InsightDocument::new(value))
    }

    /// Remove a code fence wrapped around the completion
    ///
    /// When the trimmed text starts with "```" its first and last lines are
    /// dropped, whatever they contain.
    pub fn strip_code_fence(completion: &str) -> String {
        let text = completion.trim();
        if !text.starts_with("```") {
            return text.to_string();
        }

        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() <= 2 {
            return String::new();
        }
        lines[1..lines.len() - 1].join("\n")
    }

    /// Build the instruction prompt for a piece of feedback
    ///
    /// The feedback is embedded verbatim; the rest of the prompt is fixed.
    pub fn format_prompt(feedback_text: &str) -> String {
        format!(
            r#"You are a Voice-of-Customer (VoC) Intelligence Engine. Analyze the following customer feedback and categorize it into actionable insights.

FEEDBACK TO ANALYZE:
{}

Respond ONLY with a valid JSON object in this exact format (no markdown, no explanation):
{{
    "p0_issues": [
        {{
            "title": "Brief title of the critical issue",
            "description": "Detailed description",
            "urgency": "critical"
        }}
    ],
    "product_gaps": [
        {{
            "title": "Missing feature or improvement",
            "description": "What customers are asking for",
            "frequency": "how often mentioned (high/medium/low)"
        }}
    ],
    "sentiment": {{
        "score": 0,
        "label": "positive/neutral/negative",
        "summary": "Brief summary of overall customer sentiment"
    }},
    "quick_wins": [
        {{
            "title": "Easy improvement that could make customers happier",
            "impact": "high/medium/low"
        }}
    ],
    "key_themes": ["theme1", "theme2", "theme3"]
}}

Rules:
- Score sentiment from -100 (very negative) to +100 (very positive)
- P0 Issues are critical bugs or broken functionality that need immediate attention
- Product Gaps are features customers want but don't exist
- Quick Wins are small improvements with high impact
- Key Themes are recurring topics in the feedback
- If no items exist for a category, return an empty array []
"#,
            feedback_text
        )
    }
}
