/// Feedback analyzer and completion backend implementations
pub mod analyzer;
pub mod backends;
pub mod report;

pub use analyzer::{AnalysisFailure, AnalysisOutcome, AnalyzerSettings, FailureKind, FeedbackAnalyzer};
pub use backends::{CompletionBackend, CompletionRequest, GeminiBackend, MockBackend, MockReply};
pub use report::{InsightDocument, InsightReport, Sentiment};
