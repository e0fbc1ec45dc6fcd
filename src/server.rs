//! HTTP front end.
//!
//! Exposes the pipeline as two POST operations plus a health probe:
//! `/analyze` runs the buffered path and returns the result as JSON;
//! `/stream-analyze` forwards completion fragments as `data: <json>\n\n`
//! frames followed by exactly one `final` or `error` frame. The
//! [`Analyzer`] is built once at startup and shared read-only across
//! requests.

use std::convert::Infallible;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use crate::analyze::{AnalysisEvent, Analyzer};
use crate::config::AppConfig;
use crate::error::AnalyzeError;

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/stream-analyze", post(stream_analyze))
        .with_state(state)
}

/// Build the analyzer and serve until ctrl-c.
pub async fn serve(config: AppConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let analyzer = Analyzer::new(&config).context("failed to initialize analyzer")?;
    tracing::info!("analyzer ready");

    let state = AppState {
        analyzer: Arc::new(analyzer),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    note_text: String,
}

fn status_for(error: &AnalyzeError) -> StatusCode {
    match error {
        AnalyzeError::EmptyNote => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(error: &AnalyzeError) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": error.to_string() }))
}

async fn analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Response {
    let note = payload.note_text.trim();
    if note.is_empty() {
        let e = AnalyzeError::EmptyNote;
        return (status_for(&e), error_body(&e)).into_response();
    }

    match state.analyzer.analyze(note).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "analyze request failed");
            (status_for(&e), error_body(&e)).into_response()
        }
    }
}

async fn stream_analyze(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Response {
    let note = payload.note_text.trim();
    if note.is_empty() {
        let e = AnalyzeError::EmptyNote;
        return (status_for(&e), error_body(&e)).into_response();
    }

    let body = match state.analyzer.analyze_streaming(note).await {
        Ok(stream) => {
            Body::from_stream(stream.map(|event| Ok::<_, Infallible>(encode_frame(event))))
        }
        Err(e) => {
            // Failures before the stream opens still answer with an error
            // frame, matching the in-stream failure shape.
            tracing::warn!(error = %e, "stream-analyze request failed");
            Body::from(encode_frame(Err(e)))
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Encode one pipeline event as a wire frame: `data: <json>\n\n` with
/// payload `{"chunk", "type": "stream"}`, `{"result", "type": "final"}`
/// or `{"error", "type": "error"}`.
fn encode_frame(event: Result<AnalysisEvent, AnalyzeError>) -> String {
    let payload = match event {
        Ok(AnalysisEvent::Chunk(chunk)) => {
            serde_json::json!({ "chunk": chunk, "type": "stream" })
        }
        Ok(AnalysisEvent::Final(result)) => {
            serde_json::json!({ "result": result, "type": "final" })
        }
        Err(e) => serde_json::json!({ "error": e.to_string(), "type": "error" }),
    };
    match serde_json::to_string(&payload) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(_) => "data: {\"error\":\"serialization failed\",\"type\":\"error\"}\n\n".to_string(),
    }
}
