//! Service descriptor and health probes.

use std::future::Future;
use std::time::Duration;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` when every probe passed, `degraded` otherwise
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    /// Model used for generation
    pub model: String,
    pub llm: ProbeResult,
    pub hosting: ProbeResult,
}

async fn probe<F, E>(fut: F) -> ProbeResult
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(())) => ProbeResult { ok: true, error: None },
        Ok(Err(e)) => ProbeResult {
            ok: false,
            error: Some(e.to_string()),
        },
        Err(_) => ProbeResult {
            ok: false,
            error: Some("probe timed out".to_string()),
        },
    }
}

/// GET /health - Upstream reachability. Always answers 200.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (llm, hosting) = tokio::join!(
        probe(state.generator.ping()),
        probe(state.hosting.ping())
    );

    if !llm.ok || !hosting.ok {
        tracing::warn!(
            llm = ?llm.error,
            hosting = ?hosting.error,
            "Health probe degraded"
        );
    }

    Json(HealthResponse {
        status: if llm.ok && hosting.ok { "healthy" } else { "degraded" },
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        model: state.config.llm_model.clone(),
        llm,
        hosting,
    })
}

/// GET / - Service descriptor.
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "pagesmith",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Generates single-page web applications from task briefs and publishes them",
        "endpoints": {
            "deploy": "POST /api/deploy",
            "validate": "POST /api/validate",
            "status": "GET /api/status/{task}",
            "health": "GET /health"
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
