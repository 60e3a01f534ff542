//! Status HTTP API
//!
//! Exposes the readiness monitor and the scan pipeline over HTTP.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (always returns 200 if running)
//! - `GET /readiness` - Current readiness snapshot
//! - `POST /readiness/recheck` - Start a fresh retry chain (202)
//! - `POST /scan` - Submit the request body as an image
//! - `GET /metrics` - Prometheus metrics

mod metrics;
mod server;
mod state;

pub use metrics::render_metrics;
pub use server::{MAX_UPLOAD_BYTES, create_router, start_api_server};
pub use state::{ApiState, HealthResponse, ScanResponse, SubmissionStats};
