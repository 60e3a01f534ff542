//! Readiness monitor
//!
//! Owns the application's belief about whether the inference service can
//! serve requests. One retry chain runs at a time as a spawned task; each
//! chain is numbered, and a chain may only publish while its number is
//! current, so a superseded chain can never resurrect stale state.
//!
//! ```text
//! Unknown ──start/recheck──▶ Checking ──probe ok──▶ Ready
//!                              │  ▲                   │
//!                 fail, budget │  │ fail, attempts    │ reported direct
//!                    exhausted │  │ remain (backoff)  │ probe failure
//!                              ▼  │                   ▼
//!                          Unreachable ──recheck──▶ Checking
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::policy::RetryPolicy;
use super::probe::LivenessProbe;

/// Availability of the remote service as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    /// No probe has completed yet
    #[default]
    Unknown,
    /// A retry chain is in progress
    Checking,
    /// The last probe succeeded
    Ready,
    /// The retry budget was exhausted; only a manual recheck leaves this state
    Unreachable,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    /// Whether no retry chain will change this state on its own
    pub fn is_settled(&self) -> bool {
        matches!(self, ReadinessState::Ready | ReadinessState::Unreachable)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Unknown => write!(f, "unknown"),
            ReadinessState::Checking => write!(f, "checking"),
            ReadinessState::Ready => write!(f, "ready"),
            ReadinessState::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Point-in-time view of the monitor, as published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessSnapshot {
    pub state: ReadinessState,
    /// 1-indexed attempt of the current chain (0 before any chain)
    pub attempt: u32,
    /// Failed probes in the current chain
    pub failures: u32,
    pub max_attempts: u32,
    /// Identifies the retry chain that produced this snapshot
    pub chain: u64,
}

impl ReadinessSnapshot {
    fn initial(max_attempts: u32) -> Self {
        Self {
            state: ReadinessState::Unknown,
            attempt: 0,
            failures: 0,
            max_attempts,
            chain: 0,
        }
    }
}

struct Inner {
    probe: Arc<dyn LivenessProbe>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<ReadinessSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Tracks remote-service readiness with bounded, escalating retries
///
/// Cheap to clone; clones share the same state. The pending retry chain is
/// cancelled when the last clone is dropped or [`shutdown`](Self::shutdown)
/// is called. Methods that start a chain must be called inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct ReadinessMonitor {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReadinessMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessMonitor")
            .field("policy", &self.inner.policy)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl ReadinessMonitor {
    /// Create an idle monitor in `Unknown`
    pub fn new(probe: Arc<dyn LivenessProbe>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ReadinessSnapshot::initial(policy.max_attempts()));
        Self {
            inner: Arc::new(Inner {
                probe,
                policy,
                state: Arc::new(state),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    pub fn state(&self) -> ReadinessState {
        self.inner.state.borrow().state
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        *self.inner.state.borrow()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ReadinessSnapshot> {
        self.inner.state.subscribe()
    }

    /// Begin the initial probe chain
    ///
    /// Only moves out of `Unknown`; returns false if a chain already ran.
    pub fn start(&self) -> bool {
        let mut task = self.inner.task.lock();
        if task.is_some() || self.state() != ReadinessState::Unknown {
            return false;
        }
        info!(
            max_attempts = self.inner.policy.max_attempts(),
            initial_delay_ms = self.inner.policy.initial_delay().as_millis(),
            "Starting readiness checks"
        );
        self.launch(&mut task);
        true
    }

    /// Force re-evaluation from scratch
    ///
    /// Cancels any pending retry (its timer never fires), resets to
    /// `Unknown` and starts a fresh chain with a fresh attempt counter.
    pub fn recheck(&self) -> ReadinessSnapshot {
        let mut task = self.inner.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.inner.state.send_modify(|snap| {
            snap.chain += 1;
            snap.state = ReadinessState::Unknown;
            snap.attempt = 0;
            snap.failures = 0;
        });
        info!("Manual readiness recheck requested");
        self.launch(&mut task)
    }

    /// A caller's own probe failed
    ///
    /// Downgrades `Ready` by starting a new chain; ignored in any other
    /// state (a running chain already covers it, and `Unreachable` waits
    /// for a manual recheck). Returns whether a new chain was started.
    pub fn report_probe_failure(&self) -> bool {
        let mut task = self.inner.task.lock();
        if self.state() != ReadinessState::Ready {
            return false;
        }
        warn!("Direct probe failed while service was believed ready, re-checking");
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.launch(&mut task);
        true
    }

    /// Wait until the monitor reaches `Ready` or `Unreachable`
    ///
    /// Never resolves for a monitor that is never started.
    pub async fn wait_settled(&self) -> ReadinessState {
        let mut rx = self.subscribe();
        match rx.wait_for(|snap| snap.state.is_settled()).await {
            Ok(snap) => snap.state,
            Err(_) => self.state(),
        }
    }

    /// Cancel any pending probe or retry timer
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.task.lock().take() {
            debug!("Readiness monitor shut down");
            handle.abort();
        }
    }

    /// Start a new chain; the caller holds the task lock
    fn launch(&self, task: &mut Option<JoinHandle<()>>) -> ReadinessSnapshot {
        let mut started = ReadinessSnapshot::initial(self.inner.policy.max_attempts());
        self.inner.state.send_modify(|snap| {
            snap.chain += 1;
            snap.state = ReadinessState::Checking;
            snap.attempt = 1;
            snap.failures = 0;
            started = *snap;
        });

        *task = Some(tokio::spawn(run_chain(
            self.inner.probe.clone(),
            self.inner.policy,
            self.inner.state.clone(),
            started.chain,
        )));
        started
    }
}

/// Publish a change if `chain` is still current
fn publish(
    state: &watch::Sender<ReadinessSnapshot>,
    chain: u64,
    update: impl FnOnce(&mut ReadinessSnapshot),
) -> bool {
    state.send_if_modified(|snap| {
        if snap.chain != chain {
            return false;
        }
        update(snap);
        true
    })
}

/// Probe sequentially until success or the attempt budget runs out
async fn run_chain(
    probe: Arc<dyn LivenessProbe>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<ReadinessSnapshot>>,
    chain: u64,
) {
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            debug!(chain, attempt, delay_ms = delay.as_millis(), "Waiting before next probe");
            tokio::time::sleep(delay).await;
            if !publish(&state, chain, |snap| snap.attempt = attempt) {
                return;
            }
        }

        match probe.probe().await {
            Ok(()) => {
                info!(chain, attempt, "Inference service is ready");
                publish(&state, chain, |snap| snap.state = ReadinessState::Ready);
                return;
            }
            Err(e) if attempt == max_attempts => {
                warn!(
                    chain,
                    attempts = max_attempts,
                    error = %e,
                    "Inference service unreachable after all attempts"
                );
                publish(&state, chain, |snap| {
                    snap.failures = attempt;
                    snap.state = ReadinessState::Unreachable;
                });
                return;
            }
            Err(e) => {
                debug!(chain, attempt, error = %e, "Probe failed, will retry");
                if !publish(&state, chain, |snap| snap.failures = attempt) {
                    return;
                }
            }
        }
    }
}
