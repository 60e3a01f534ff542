//! freshscan - produce freshness scanner client
//!
//! Submits produce photos to a remote inference service that may be
//! cold-starting, and records the verdicts.
//!
//! ## Architecture
//!
//! - A [`readiness::ReadinessMonitor`] owns the belief about whether the
//!   service is up, refreshed by an initial probe and a bounded,
//!   escalating retry chain
//! - A [`scan::ScanPipeline`] re-checks the service directly before every
//!   upload, so payloads are never sent to a service that is down
//! - Notices ("starting", "gave up") are derived from readiness transitions
//!   and elapsed time, and rendering is left to the caller
//!
//! ## Modules
//!
//! - [`client`] - HTTP client for the inference service
//! - [`readiness`] - Retry policy, monitor, probes and notices
//! - [`scan`] - Capture, submission pipeline, results and recording
//! - [`config`] - Configuration parsing
//! - [`api`] - Local status HTTP API and Prometheus metrics

pub mod api;
pub mod client;
pub mod config;
pub mod readiness;
pub mod scan;
