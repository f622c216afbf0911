//! HTTP front end
//!
//! `GET /` serves the feedback form and `POST /analyze` runs the analyzer and
//! renders the report. All state is read-only after startup.

pub mod flash;
pub mod handlers;
pub mod render;

use crate::ai::FeedbackAnalyzer;
use crate::error::WebError;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::sync::Arc;
use std::time::Instant;

pub use flash::{Flash, FlashSigner};
pub use render::Templates;

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<FeedbackAnalyzer>,
    pub templates: Arc<Templates>,
    pub flash: FlashSigner,
}

impl AppState {
    /// Compile templates and bundle them with the analyzer
    pub fn new(analyzer: FeedbackAnalyzer, flash: FlashSigner) -> Result<Self, WebError> {
        Ok(Self {
            analyzer: Arc::new(analyzer),
            templates: Arc::new(Templates::new()?),
            flash,
        })
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/analyze", post(handlers::analyze))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        start.elapsed()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AnalyzerSettings, MockBackend, MockReply};
    use crate::web::flash::FLASH_COOKIE;
    use crate::web::handlers::EMPTY_FEEDBACK_NOTICE;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    const REPORT_JSON: &str = r#"{
        "p0_issues": [{"title": "Exports time out", "description": "Large CSV exports never finish", "urgency": "critical"}],
        "product_gaps": [{"title": "Slack integration", "description": "Teams want alerts in Slack", "frequency": "high"}],
        "sentiment": {"score": 42, "label": "positive", "summary": "Generally satisfied"},
        "quick_wins": [],
        "key_themes": ["exports", "integrations"]
    }"#;

    fn app_with(backend: Arc<MockBackend>, api_key: Option<&str>) -> Router {
        let analyzer = FeedbackAnalyzer::new(
            backend,
            AnalyzerSettings {
                api_key: api_key.map(str::to_string),
                model: "gemini-2.5-flash".to_string(),
                strict_schema: false,
            },
        );
        let state = AppState::new(analyzer, FlashSigner::from_secret(Some("test-secret"))).unwrap();
        router(state)
    }

    fn post_form(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/analyze")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_renders_form() {
        let app = app_with(Arc::new(MockBackend::success()), Some("key"));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let html = body_text(response).await;
        assert!(html.contains("action=\"/analyze\""));
        assert!(!html.contains("class=\"notice"));
    }

    #[tokio::test]
    async fn test_empty_feedback_redirects_without_analysis() {
        for body in ["feedback=", "feedback=+++%0A%09", ""] {
            let backend = Arc::new(MockBackend::success());
            let app = app_with(backend.clone(), Some("key"));

            let response = app.oneshot(post_form(body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER, "body {:?}", body);
            assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
            let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
            assert!(cookie.starts_with(&format!("{}=", FLASH_COOKIE)));
            assert_eq!(backend.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_flash_notice_shown_once_after_redirect() {
        let app = app_with(Arc::new(MockBackend::success()), Some("key"));

        let redirect = app.clone().oneshot(post_form("feedback=")).await.unwrap();
        let set_cookie = redirect.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        let cookie_pair = set_cookie.split(';').next().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(COOKIE, cookie_pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
        let html = body_text(response).await;
        assert!(html.contains(EMPTY_FEEDBACK_NOTICE));
    }

    #[tokio::test]
    async fn test_forged_flash_cookie_is_ignored() {
        let app = app_with(Arc::new(MockBackend::success()), Some("key"));
        let forged = FlashSigner::from_secret(Some("attacker")).encode(&[Flash::error("Send us your password")]);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(COOKIE, format!("{}={}", FLASH_COOKIE, forged))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(SET_COOKIE).is_some());
        let html = body_text(response).await;
        assert!(!html.contains("Send us your password"));
    }

    #[tokio::test]
    async fn test_analyze_renders_report() {
        let backend = Arc::new(MockBackend::with_text(format!("```json\n{}\n```", REPORT_JSON)));
        let app = app_with(backend.clone(), Some("key"));

        let response = app
            .oneshot(post_form("feedback=++Exports+are+slow+and+we+need+Slack++"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Exports time out"));
        assert!(html.contains("Slack integration"));
        assert!(html.contains("<strong>42</strong>"));
        assert!(html.contains("No quick wins found."));
        assert!(html.contains(">Exports are slow and we need Slack</textarea>"));

        assert_eq!(backend.call_count(), 1);
        let prompt = backend.last_request().unwrap().prompt;
        assert!(prompt.contains("FEEDBACK TO ANALYZE:\nExports are slow and we need Slack\n"));
    }

    #[tokio::test]
    async fn test_analyze_failure_keeps_feedback() {
        let backend = Arc::new(MockBackend::with_replies(vec![MockReply::Failure(
            "Gemini API returned error 429 Too Many Requests: Quota exceeded".to_string(),
        )]));
        let app = app_with(backend, Some("key"));

        let response = app.oneshot(post_form("feedback=Search+is+broken")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("API Error: Gemini API returned error 429 Too Many Requests: Quota exceeded"));
        assert!(html.contains(">Search is broken</textarea>"));
        assert!(!html.contains("Sentiment Pulse"));
    }

    #[tokio::test]
    async fn test_analyze_without_credential_shows_config_error() {
        let backend = Arc::new(MockBackend::success());
        let app = app_with(backend.clone(), None);

        let response = app.oneshot(post_form("feedback=Love+it")).await.unwrap();

        let html = body_text(response).await;
        assert!(html.contains("GOOGLE_API_KEY not configured. Please set the environment variable."));
        assert!(html.contains(">Love it</textarea>"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_unparseable_reply() {
        let app = app_with(Arc::new(MockBackend::with_text("{\"p0_issues\": [")), Some("key"));

        let response = app.oneshot(post_form("feedback=hello")).await.unwrap();

        let html = body_text(response).await;
        assert!(html.contains("Failed to parse AI response: "));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = app_with(Arc::new(MockBackend::success()), Some("key"));

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_analyze_not_allowed() {
        let app = app_with(Arc::new(MockBackend::success()), Some("key"));

        let response = app
            .oneshot(Request::builder().uri("/analyze").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
