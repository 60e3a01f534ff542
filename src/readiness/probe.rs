//! Liveness probe primitive
//!
//! The `LivenessProbe` trait is the seam between readiness logic and the
//! network. The monitor and the scan pipeline both probe through it, so
//! tests can drive either with a scripted probe instead of a live server.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::client::{ClientError, InferenceClient};

/// Why a single probe did not succeed
///
/// Every variant counts the same for retry purposes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("service unreachable: {0}")]
    Transport(String),

    #[error("service responded with status {0}")]
    Status(u16),
}

impl From<ClientError> for ProbeError {
    fn from(err: ClientError) -> Self {
        match err.status() {
            Some(status) => ProbeError::Status(status),
            None => ProbeError::Transport(err.to_string()),
        }
    }
}

/// A lightweight check that the remote service can respond
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe once; implementations must bound their own duration
    async fn probe(&self) -> Result<(), ProbeError>;
}

#[async_trait]
impl LivenessProbe for InferenceClient {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.health().await.map_err(ProbeError::from)
    }
}

#[async_trait]
impl<T: LivenessProbe + ?Sized> LivenessProbe for Arc<T> {
    async fn probe(&self) -> Result<(), ProbeError> {
        (**self).probe().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted probe for driving the monitor under paused time

    use std::collections::VecDeque;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;

    /// Returns scripted outcomes in order, then a fixed fallback
    #[derive(Debug)]
    pub(crate) struct ScriptedProbe {
        script: Mutex<VecDeque<Result<(), ProbeError>>>,
        fallback: Result<(), ProbeError>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProbe {
        pub(crate) fn new(
            script: impl IntoIterator<Item = Result<(), ProbeError>>,
            fallback: Result<(), ProbeError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn always_failing() -> Arc<Self> {
            Self::new([], Err(ProbeError::Status(503)))
        }

        pub(crate) fn always_ok() -> Arc<Self> {
            Self::new([], Ok(()))
        }

        /// Fails `n` times, then succeeds
        pub(crate) fn failing_then_ok(n: usize) -> Arc<Self> {
            Self::new(
                std::iter::repeat_n(Err(ProbeError::Status(503)), n),
                Ok(()),
            )
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        /// Offsets of each call from `origin`
        pub(crate) fn call_offsets(&self, origin: Instant) -> Vec<std::time::Duration> {
            self.calls
                .lock()
                .iter()
                .map(|at| at.duration_since(origin))
                .collect()
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self) -> Result<(), ProbeError> {
            self.calls.lock().push(Instant::now());
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }
}
