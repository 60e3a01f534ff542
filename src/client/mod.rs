//! Inference Service Client
//!
//! Hand-written client for the remote freshness-inference HTTP API.
//! The service exposes a liveness endpoint and a multipart prediction endpoint.

mod service;
mod types;

pub use service::{
    ClientError, ClientResult, DEFAULT_PROBE_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT, InferenceClient,
    UPLOAD_FIELD, UPLOAD_FILENAME,
};
pub use types::*;
