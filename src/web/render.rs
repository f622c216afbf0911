//! HTML rendering with handlebars
//!
//! Templates live in `templates/` and are compiled into the binary. Output is
//! HTML-escaped by the registry, so model text and user feedback can be
//! rendered as-is.

use crate::ai::report::{InsightReport, Timestamp};
use crate::ai::AnalysisOutcome;
use crate::error::WebError;
use crate::web::flash::Flash;
use chrono::Utc;
use handlebars::Handlebars;
use serde::Serialize;

const LAYOUT: &str = include_str!("../../templates/layout.hbs");
const NOTICES: &str = include_str!("../../templates/notices.hbs");
const INDEX: &str = include_str!("../../templates/index.hbs");
const RESULTS: &str = include_str!("../../templates/results.hbs");

/// View model for the input form
#[derive(Debug, Serialize)]
pub struct IndexPage<'a> {
    pub notices: &'a [Flash],
    pub model: &'a str,
    /// Pre-filled textarea content
    pub feedback: &'a str,
}

/// Report as the results template sees it
#[derive(Debug, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: InsightReport,
    pub gauge_percent: u8,
    pub sentiment_class: &'static str,
}

impl ReportView {
    pub fn new(report: InsightReport) -> Self {
        let sentiment_class = match report.sentiment.label.to_lowercase().as_str() {
            "positive" => "positive",
            "negative" => "negative",
            _ => "neutral",
        };
        Self {
            gauge_percent: report.sentiment.gauge_percent(),
            sentiment_class,
            report,
        }
    }
}

/// View model for the results page, used for both success and failure
#[derive(Debug, Serialize)]
pub struct ResultsPage<'a> {
    pub notices: Vec<Flash>,
    pub model: &'a str,
    pub original_feedback: &'a str,
    pub report: Option<ReportView>,
    pub analyzed_at: String,
}

impl<'a> ResultsPage<'a> {
    /// Build the page for an analysis outcome
    ///
    /// A failure becomes an error notice above the re-filled form.
    pub fn from_outcome(outcome: &AnalysisOutcome, original_feedback: &'a str, model: &'a str) -> Self {
        Self::at(outcome, original_feedback, model, Utc::now())
    }

    fn at(
        outcome: &AnalysisOutcome,
        original_feedback: &'a str,
        model: &'a str,
        analyzed_at: Timestamp,
    ) -> Self {
        let (report, notices) = match outcome {
            AnalysisOutcome::Success(document) => (Some(ReportView::new(document.report())), Vec::new()),
            AnalysisOutcome::Failure(failure) => (None, vec![Flash::error(failure.message.clone())]),
        };

        Self {
            notices,
            model,
            original_feedback,
            report,
            analyzed_at: analyzed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

/// Compiled template registry
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    /// Compile the built-in templates
    pub fn new() -> Result<Self, WebError> {
        let mut registry = Handlebars::new();
        registry.register_partial("layout", LAYOUT)?;
        registry.register_partial("notices", NOTICES)?;
        registry.register_template_string("index", INDEX)?;
        registry.register_template_string("results", RESULTS)?;

        Ok(Self { registry })
    }

    pub fn render_index(&self, page: &IndexPage<'_>) -> Result<String, WebError> {
        Ok(self.registry.render("index", page)?)
    }

    pub fn render_results(&self, page: &ResultsPage<'_>) -> Result<String, WebError> {
        Ok(self.registry.render("results", page)?)
    }
}
