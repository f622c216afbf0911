use crate::error::WebError;
use crate::web::flash::{Flash, FlashSigner};
use crate::web::render::{IndexPage, ResultsPage};
use crate::web::AppState;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use log::{error, info};
use serde::Deserialize;

/// Notice shown when the form is submitted without any feedback
pub const EMPTY_FEEDBACK_NOTICE: &str = "Please enter some feedback to analyze.";

/// Body of `POST /analyze`
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeForm {
    #[serde(default)]
    pub feedback: String,
}

/// `GET /`: the feedback form, plus any pending notices
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, WebError> {
    let pending = state.flash.take(&headers);
    let notices = pending.as_deref().unwrap_or_default();

    let html = state.templates.render_index(&IndexPage {
        notices,
        model: &state.analyzer.settings().model,
        feedback: "",
    })?;

    if pending.is_some() {
        Ok(([(SET_COOKIE, FlashSigner::clear_cookie())], Html(html)).into_response())
    } else {
        Ok(Html(html).into_response())
    }
}

/// `POST /analyze`: run the analyzer and render the report
///
/// Blank submissions are bounced back to the form with a notice and never
/// reach the analyzer.
pub async fn analyze(
    State(state): State<AppState>,
    Form(form): Form<AnalyzeForm>,
) -> Result<Response, WebError> {
    let feedback = form.feedback.trim();

    if feedback.is_empty() {
        info!("Rejected empty feedback submission");
        let cookie = state.flash.set_cookie(&[Flash::error(EMPTY_FEEDBACK_NOTICE)]);
        return Ok(([(SET_COOKIE, cookie)], Redirect::to("/")).into_response());
    }

    let outcome = state.analyzer.analyze(feedback).await;
    let page = ResultsPage::from_outcome(&outcome, feedback, &state.analyzer.settings().model);
    let html = state.templates.render_results(&page)?;

    Ok(Html(html).into_response())
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        error!("Failed to render page: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
