//! Backend readiness orchestration
//!
//! A remote inference service may be cold-starting. This module keeps a
//! single, subscribable belief about whether it can serve requests:
//!
//! - [`probe`] - the liveness probe primitive (`LivenessProbe`)
//! - [`policy`] - bounded multiplicative backoff (`RetryPolicy`)
//! - [`monitor`] - the state machine and retry chain (`ReadinessMonitor`)
//! - [`notice`] - when to tell the user what (`NoticeTracker`)

pub mod monitor;
pub mod notice;
pub mod policy;
pub mod probe;

pub use monitor::{ReadinessMonitor, ReadinessSnapshot, ReadinessState};
pub use notice::{
    DEFAULT_NOTICE_DEBOUNCE, Notice, NoticeLevel, NoticeSink, NoticeTracker, watch_notices,
};
pub use policy::{PolicyError, RetryPolicy};
pub use probe::{LivenessProbe, ProbeError};
