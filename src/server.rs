//! Web server module.
//!
//! Serves the text exposition of the probe metrics on the configured
//! telemetry path, plus a small landing page on `/`.

use std::sync::Arc;

use askama::Template;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::metrics::Exposition;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub exposition: Arc<Exposition>,
    pub telemetry_path: String,
}

impl AppState {
    pub fn new(exposition: Arc<Exposition>, telemetry_path: impl Into<String>) -> Self {
        Self {
            exposition,
            telemetry_path: telemetry_path.into(),
        }
    }
}

/// Landing page template.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    telemetry_path: String,
}

/// Wrapper to render Askama templates as Axum responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(rendered) => Html(rendered).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Template render failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(index_handler))
        .route(&telemetry_path, get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Landing page handler.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(IndexTemplate {
        telemetry_path: state.telemetry_path.clone(),
    })
}

/// Scrape handler: encodes a fresh snapshot on every request.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.exposition.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.exposition.content_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response()
        }
    }
}
