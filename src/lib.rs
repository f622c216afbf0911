/// Error types for the feedback analyzer and web front end
pub mod error;

/// Feedback analyzer and completion backend implementations
pub mod ai;

/// Configuration management
pub mod config;

/// HTTP routes, templates and flash notices
pub mod web;

// Re-export commonly used types
pub use ai::{AnalysisOutcome, FeedbackAnalyzer};
pub use error::{AnalysisError, ConfigError, WebError};
