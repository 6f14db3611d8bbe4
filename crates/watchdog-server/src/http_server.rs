//! HTTP trigger surface for the watchdog.

use crate::runner::PassRunner;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// HTTP server exposing the run trigger.
pub struct TriggerServer {
    runner: Arc<dyn PassRunner>,
    listen_addr: String,
}

impl TriggerServer {
    pub fn new(runner: Arc<dyn PassRunner>, listen_addr: String) -> Self {
        Self {
            runner,
            listen_addr,
        }
    }

    /// Run the HTTP server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(listen_addr = %self.listen_addr, "Starting trigger HTTP server");

        let app = router(self.runner);
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Trigger server listening");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn router(runner: Arc<dyn PassRunner>) -> Router {
    Router::new()
        .route("/run", post(run_handler).get(run_handler))
        .route("/healthz", get(healthz_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(runner)
}

/// Handler for the /run trigger: one full pass over all collections.
async fn run_handler(State(runner): State<Arc<dyn PassRunner>>) -> Response {
    match runner.run_once().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!(error = %e, "triggered run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MockPassRunner;
    use crate::types::RunSummary;
    use axum::body::to_bytes;
    use common::Error;

    #[tokio::test]
    async fn test_run_handler_success() {
        let mut runner = MockPassRunner::new();
        runner.expect_run_once().returning(|| {
            Ok(RunSummary {
                message: "Server health check complete.".to_string(),
                results: Vec::new(),
            })
        });

        let response = run_handler(State(Arc::new(runner))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Server health check complete.");
        assert!(body["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_handler_failure_is_500() {
        let mut runner = MockPassRunner::new();
        runner
            .expect_run_once()
            .returning(|| Err(Error::row_source("quota exceeded")));

        let response = run_handler(State(Arc::new(runner))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("quota exceeded")
        );
    }

    #[tokio::test]
    async fn test_healthz() {
        assert_eq!(healthz_handler().await, "ok");
    }
}
