use thiserror::Error;

/// Errors that can occur while obtaining or parsing a completion
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("GOOGLE_API_KEY not configured. Please set the environment variable.")]
    MissingCredential,

    #[error("{0}")]
    BackendError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{source}")]
    MalformedJson {
        #[source]
        source: serde_json::Error,
        raw: String,
    },

    #[error("AI response did not match the expected shape: {violations}")]
    SchemaMismatch { violations: String, raw: String },
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors raised while producing an HTML response
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Template registration failed: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("Template rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),
}
