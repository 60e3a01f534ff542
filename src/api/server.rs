//! HTTP Server for Status API
//!
//! Axum-based HTTP server providing readiness and scan endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::metrics::metrics_handler;
use super::state::{ApiState, HealthResponse, ScanResponse};
use crate::readiness::ReadinessSnapshot;
use crate::scan::{CapturedImage, FailureReason, ImageSource, SubmissionOutcome};

/// Largest image accepted by `POST /scan`
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Start the API server on the given port
///
/// Runs until Ctrl+C is received.
pub async fn start_api_server(
    port: u16,
    state: ApiState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = port, "Starting status API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Status API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/readiness", get(readiness_handler))
        .route("/readiness/recheck", post(recheck_handler))
        .route("/scan", post(scan_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
///
/// Returns 200 while the process is running, whatever the remote service is doing.
async fn health_handler(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        readiness: state.monitor().state(),
    })
}

async fn readiness_handler(State(state): State<ApiState>) -> Json<ReadinessSnapshot> {
    Json(state.monitor().snapshot())
}

/// Manual recheck
///
/// Returns 202 with the snapshot of the newly started chain.
async fn recheck_handler(State(state): State<ApiState>) -> (StatusCode, Json<ReadinessSnapshot>) {
    let snapshot = state.monitor().recheck();
    (StatusCode::ACCEPTED, Json(snapshot))
}

/// Submit the raw request body as an image
async fn scan_handler(State(state): State<ApiState>, body: Bytes) -> (StatusCode, Json<ScanResponse>) {
    let image = CapturedImage::new(body.to_vec(), ImageSource::File);
    let outcome = state.pipeline().submit(&image).await;
    state.record_outcome(&outcome);

    (outcome_status(&outcome), Json(ScanResponse::from(outcome)))
}

fn outcome_status(outcome: &SubmissionOutcome) -> StatusCode {
    match outcome {
        SubmissionOutcome::Success(_) => StatusCode::OK,
        SubmissionOutcome::Failure(FailureReason::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
        SubmissionOutcome::Failure(FailureReason::NetworkError)
        | SubmissionOutcome::Failure(FailureReason::ServerError(_)) => StatusCode::BAD_GATEWAY,
        SubmissionOutcome::Failure(FailureReason::InvalidPayload) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::InferenceClient;
    use crate::readiness::probe::testing::ScriptedProbe;
    use crate::readiness::{ReadinessMonitor, ReadinessState, RetryPolicy};
    use crate::scan::{Classification, RecordError, ScanPipeline, ScanRecorder};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use freshscan_testkit::{FakeService, PseudoGenerator, unused_url};
    use std::sync::Arc;
    use tower::ServiceExt;

    pub(crate) struct NoopRecorder;

    #[async_trait]
    impl ScanRecorder for NoopRecorder {
        async fn record_scan(
            &self,
            _user_id: &str,
            _classification: Classification,
            _confidence: f64,
            _subject_label: &str,
        ) -> Result<(), RecordError> {
            Ok(())
        }
    }

    pub(crate) fn state_for(base_url: &str) -> ApiState {
        let client = InferenceClient::new(base_url).unwrap();
        let monitor = ReadinessMonitor::new(ScriptedProbe::always_failing(), RetryPolicy::default());
        ApiState::new(ScanPipeline::new(client, monitor, Arc::new(NoopRecorder), "api"))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(state_for(&unused_url()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["healthy"], true);
        assert_eq!(json["readiness"], "unknown");
    }

    #[tokio::test]
    async fn test_readiness_endpoint() {
        let app = create_router(state_for(&unused_url()));

        let response = app
            .oneshot(Request::builder().uri("/readiness").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["state"], "unknown");
        assert_eq!(json["attempt"], 0);
        assert_eq!(json["max_attempts"], 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_endpoint() {
        let state = state_for(&unused_url());
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/readiness/recheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Should return 202 Accepted while the new chain runs
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["state"], "checking");
        assert_eq!(json["attempt"], 1);
        assert_eq!(state.monitor().state(), ReadinessState::Checking);
    }

    #[tokio::test]
    async fn test_scan_success() {
        let fake = FakeService::start().await.unwrap();
        let state = state_for(&fake.url());
        let app = create_router(state.clone());
        let image = PseudoGenerator::new(3).jpeg_payload(2048);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scan")
                    .body(Body::from(image))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["outcome"]["outcome"], "success");
        assert_eq!(json["outcome"]["value"]["classification"], "fresh");
        assert!(json.get("message").is_none());

        assert_eq!(state.stats().succeeded, 1);
        assert_eq!(state.last_result().unwrap().subject_label(), "apple");
        assert_eq!(fake.predict_calls(), 1);
    }

    #[tokio::test]
    async fn test_scan_service_down() {
        let state = state_for(&unused_url());
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scan")
                    .body(Body::from(vec![0xFF, 0xD8, 0xFF, 0xD9]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["outcome"]["value"]["reason"], "not_ready");
        assert!(json["message"].as_str().unwrap().contains("not ready"));
        assert_eq!(state.stats().not_ready, 1);
    }

    #[tokio::test]
    async fn test_scan_empty_body() {
        let app = create_router(state_for(&unused_url()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scan")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(
            outcome_status(&SubmissionOutcome::Failure(FailureReason::ServerError(500))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            outcome_status(&SubmissionOutcome::Failure(FailureReason::NetworkError)),
            StatusCode::BAD_GATEWAY
        );
    }
}
