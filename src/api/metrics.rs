//! Prometheus metrics
//!
//! Exposes metrics in Prometheus text format at `/metrics`.
//!
//! ## Metrics Exposed
//!
//! - `freshscan_readiness_state` - Monitor state (0=unknown, 1=checking, 2=ready, 3=unreachable)
//! - `freshscan_readiness_attempt` - Attempt number within the current retry chain
//! - `freshscan_readiness_failures` - Failed probes within the current retry chain
//! - `freshscan_readiness_chain` - Number of retry chains started
//! - `freshscan_submissions_total` - Submissions by outcome
//! - `freshscan_uptime_seconds` - Time since the API started

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write;
use tracing::error;

use super::state::ApiState;
use crate::readiness::ReadinessState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Generate Prometheus-format metrics
pub async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match render_metrics(&state) {
        Ok(output) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], output),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", CONTENT_TYPE)],
                String::new(),
            )
        }
    }
}

fn state_value(state: ReadinessState) -> u8 {
    match state {
        ReadinessState::Unknown => 0,
        ReadinessState::Checking => 1,
        ReadinessState::Ready => 2,
        ReadinessState::Unreachable => 3,
    }
}

fn gauge(output: &mut String, name: &str, help: &str, value: impl std::fmt::Display) -> std::fmt::Result {
    writeln!(output, "# HELP {name} {help}")?;
    writeln!(output, "# TYPE {name} gauge")?;
    writeln!(output, "{name} {value}")?;
    writeln!(output)
}

pub fn render_metrics(state: &ApiState) -> Result<String, std::fmt::Error> {
    let snapshot = state.monitor().snapshot();
    let stats = state.stats();

    let mut output = String::new();

    writeln!(output, "# HELP freshscan_info Build information")?;
    writeln!(output, "# TYPE freshscan_info gauge")?;
    writeln!(
        output,
        "freshscan_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(output)?;

    gauge(
        &mut output,
        "freshscan_readiness_state",
        "Monitor state (0=unknown, 1=checking, 2=ready, 3=unreachable)",
        state_value(snapshot.state),
    )?;
    gauge(
        &mut output,
        "freshscan_readiness_attempt",
        "Attempt number within the current retry chain",
        snapshot.attempt,
    )?;
    gauge(
        &mut output,
        "freshscan_readiness_failures",
        "Failed probes within the current retry chain",
        snapshot.failures,
    )?;
    gauge(
        &mut output,
        "freshscan_readiness_chain",
        "Number of retry chains started",
        snapshot.chain,
    )?;

    writeln!(output, "# HELP freshscan_submissions_total Submissions by outcome")?;
    writeln!(output, "# TYPE freshscan_submissions_total counter")?;
    for (outcome, count) in stats.by_outcome() {
        writeln!(
            output,
            "freshscan_submissions_total{{outcome=\"{outcome}\"}} {count}"
        )?;
    }
    writeln!(output)?;

    gauge(
        &mut output,
        "freshscan_uptime_seconds",
        "Time since the API started",
        state.elapsed().as_secs_f64(),
    )?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::tests::state_for;
    use crate::scan::{FailureReason, SubmissionOutcome};
    use freshscan_testkit::unused_url;

    #[tokio::test]
    async fn test_metrics_format() {
        let state = state_for(&unused_url());
        state.record_outcome(&SubmissionOutcome::Failure(FailureReason::ServerError(500)));
        state.record_outcome(&SubmissionOutcome::Failure(FailureReason::NotReady));

        let output = render_metrics(&state).unwrap();
        assert!(output.contains("freshscan_readiness_state 0\n"));
        assert!(output.contains("freshscan_readiness_attempt 0\n"));
        assert!(output.contains("freshscan_submissions_total{outcome=\"server_error\"} 1\n"));
        assert!(output.contains("freshscan_submissions_total{outcome=\"not_ready\"} 1\n"));
        assert!(output.contains("freshscan_submissions_total{outcome=\"success\"} 0\n"));

        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_state_values_are_distinct() {
        let values = [
            ReadinessState::Unknown,
            ReadinessState::Checking,
            ReadinessState::Ready,
            ReadinessState::Unreachable,
        ]
        .map(state_value);
        assert_eq!(values, [0, 1, 2, 3]);
    }
}
