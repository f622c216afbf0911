use crate::config::{AiConfig, DEFAULT_BASE_URL};
use crate::error::AnalysisError;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A single prompt to complete with a named model
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub api_key: String,
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("model", &self.model)
            .field("prompt_len", &self.prompt.len())
            .field("api_key", &"***")
            .finish()
    }
}

/// Trait for text-completion backends
///
/// One call, one completion: implementations must not retry, stream, or keep
/// conversation history.
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>>;
}

/// Google Gemini backend
///
/// Calls the `generateContent` REST method and returns the text of the
/// first candidate.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
}

/// Request body for `generateContent`
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Response body from `generateContent`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiBackend {
    /// Create a backend talking to the public Gemini endpoint
    pub fn new() -> Result<Self, AnalysisError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), None)
    }

    /// Create a backend with a custom base URL and optional request timeout
    ///
    /// With no timeout the reqwest default applies.
    pub fn with_base_url(base_url: String, timeout: Option<Duration>) -> Result<Self, AnalysisError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, base_url })
    }

    /// Create a backend from the `[ai]` configuration section
    pub fn from_config(config: &AiConfig) -> Result<Self, AnalysisError> {
        Self::with_base_url(
            config.base_url.clone(),
            config.timeout_seconds.map(Duration::from_secs),
        )
    }

    /// Format the `generateContent` URL for a model
    fn api_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Pull the completion text out of a successful response body
    fn extract_text(response: GeminiResponse) -> Result<String, AnalysisError> {
        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(AnalysisError::InvalidResponse(format!(
                "Gemini returned no completion ({})",
                reason
            )));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AnalysisError::InvalidResponse(format!(
                "Gemini returned an empty completion (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }

    /// Turn an error body into a readable message, preferring Google's envelope
    fn error_message(body: &str) -> String {
        match serde_json::from_str::<GoogleErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error.status {
                Some(status) => format!("{} ({})", envelope.error.message, status),
                None => envelope.error.message,
            },
            Err(_) if body.trim().is_empty() => "Unknown error".to_string(),
            Err(_) => body.trim().to_string(),
        }
    }
}

impl CompletionBackend for GeminiBackend {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.api_url(&request.model);
            debug!("Sending completion request to {}", url);

            let body = GeminiRequest {
                contents: vec![GeminiContent {
                    parts: vec![GeminiPart {
                        text: request.prompt.clone(),
                    }],
                }],
            };

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &request.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        AnalysisError::Timeout
                    } else {
                        AnalysisError::HttpError(e)
                    }
                })?;

            // Check for HTTP errors
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                return Err(AnalysisError::BackendError(format!(
                    "Gemini API returned error {}: {}",
                    status,
                    Self::error_message(&error_text)
                )));
            }

            let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
                AnalysisError::InvalidResponse(format!("Failed to decode Gemini response: {}", e))
            })?;

            Self::extract_text(gemini_response)
        })
    }
}

/// A canned reply for [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Completion text returned verbatim
    Text(String),
    /// Backend failure with this message
    Failure(String),
}

/// Mock backend for testing and offline use
///
/// Replies are returned in order, cycling back to the first after the last.
/// Every call is recorded so tests can assert how often the API was hit.
pub struct MockBackend {
    replies: Vec<MockReply>,
    current_index: Arc<Mutex<usize>>,
    delay: Option<Duration>,
    call_count: Arc<Mutex<usize>>,
    last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl MockBackend {
    /// Create a mock that always answers with the given completion text
    ///
    /// # Example
    /// ```
    /// use voc_pulse::ai::MockBackend;
    ///
    /// let backend = MockBackend::with_text(r#"{"key_themes": []}"#);
    /// assert_eq!(backend.call_count(), 0);
    /// ```
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::with_replies(vec![MockReply::Text(text.into())])
    }

    /// Create a mock with several replies, used in order
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockBackend needs at least one reply");
        Self {
            replies,
            current_index: Arc::new(Mutex::new(0)),
            delay: None,
            call_count: Arc::new(Mutex::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a mock that answers with a plausible, well-formed report
    pub fn success() -> Self {
        Self::with_text(SAMPLE_REPORT)
    }

    /// Add a delay to all replies
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `complete()` has been called
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// The last request passed to `complete()`
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl CompletionBackend for MockBackend {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnalysisError>> + Send + 'a>> {
        Box::pin(async move {
            *self.call_count.lock().unwrap() += 1;
            *self.last_request.lock().unwrap() = Some(request.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let reply = {
                let mut index = self.current_index.lock().unwrap();
                let reply = self.replies[*index % self.replies.len()].clone();
                *index += 1;
                reply
            };

            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Failure(message) => Err(AnalysisError::BackendError(message)),
            }
        })
    }
}

const SAMPLE_REPORT: &str = r#"```json
{
  "p0_issues": [
    {
      "title": "Checkout fails on saved cards",
      "description": "Several customers report the payment step spinning forever when using a saved card.",
      "urgency": "critical"
    }
  ],
  "product_gaps": [
    {
      "title": "Order export",
      "description": "Customers want to export their order history as CSV.",
      "frequency": "medium"
    }
  ],
  "sentiment": {
    "score": -20,
    "label": "negative",
    "summary": "Customers like the catalogue but are frustrated by checkout reliability."
  },
  "quick_wins": [
    {
      "title": "Show a retry button when payment stalls",
      "impact": "high"
    }
  ],
  "key_themes": ["checkout reliability", "data export", "catalogue quality"]
}
```"#;
