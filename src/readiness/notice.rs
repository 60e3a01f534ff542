//! User notifications for readiness changes
//!
//! Deciding *when* to tell the user something is separated from the timer
//! plumbing: [`NoticeTracker`] is a pure state machine fed with snapshots
//! and the current time, and [`watch_notices`] is the thin async driver
//! that feeds it. Rendering is left to a [`NoticeSink`].
//!
//! Rules:
//! - `Starting` is armed by the first failed probe of a chain and shown
//!   only if the chain is still not ready once the debounce has elapsed,
//!   at most once per chain.
//! - `GaveUp` is shown when the monitor becomes `Unreachable`.
//! - `Recovered` is shown on `Ready`, only if `Starting` was shown.
//! - Individual retries are never announced.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use super::monitor::{ReadinessSnapshot, ReadinessState};

/// Default wait before announcing a cold start
pub const DEFAULT_NOTICE_DEBOUNCE: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A user-facing signal about service availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// Still trying; be patient
    Starting,
    /// Came up after a `Starting` notice
    Recovered,
    /// Retry budget exhausted
    GaveUp,
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::Starting | Notice::Recovered => NoticeLevel::Info,
            Notice::GaveUp => NoticeLevel::Error,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Notice::Starting => "Service starting",
            Notice::Recovered => "Service ready",
            Notice::GaveUp => "Service unavailable",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::Starting => "The analysis service is starting up. This may take up to a minute.",
            Notice::Recovered => "The analysis service is ready. You can scan now.",
            Notice::GaveUp => "Could not reach the analysis service. Check your connection and retry.",
        }
    }
}

/// Receives notices for display
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

impl<F> NoticeSink for F
where
    F: Fn(Notice) + Send + Sync,
{
    fn notify(&self, notice: Notice) {
        self(notice)
    }
}

/// Decides which notices to emit from readiness transitions and elapsed time
#[derive(Debug, Clone)]
pub struct NoticeTracker {
    debounce: Duration,
    chain: u64,
    last_state: ReadinessState,
    starting_due: Option<Instant>,
    starting_shown: bool,
}

impl NoticeTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            chain: 0,
            last_state: ReadinessState::Unknown,
            starting_due: None,
            starting_shown: false,
        }
    }

    /// Feed a snapshot observed at `now`
    ///
    /// Observing the same snapshot twice never emits twice.
    pub fn observe(&mut self, snap: &ReadinessSnapshot, now: Instant) -> Option<Notice> {
        if snap.chain != self.chain {
            self.chain = snap.chain;
            self.starting_due = None;
            self.starting_shown = false;
        }
        let previous = std::mem::replace(&mut self.last_state, snap.state);

        match snap.state {
            ReadinessState::Checking => {
                if snap.failures > 0 && !self.starting_shown && self.starting_due.is_none() {
                    self.starting_due = Some(now + self.debounce);
                }
                None
            }
            ReadinessState::Ready => {
                self.starting_due = None;
                if previous != ReadinessState::Ready && self.starting_shown {
                    Some(Notice::Recovered)
                } else {
                    None
                }
            }
            ReadinessState::Unreachable => {
                self.starting_due = None;
                (previous != ReadinessState::Unreachable).then_some(Notice::GaveUp)
            }
            ReadinessState::Unknown => {
                self.starting_due = None;
                None
            }
        }
    }

    /// When the pending `Starting` notice becomes due, if one is armed
    pub fn deadline(&self) -> Option<Instant> {
        self.starting_due
    }

    /// Emit the pending `Starting` notice if its debounce has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Notice> {
        match self.starting_due {
            Some(due) if now >= due => {
                self.starting_due = None;
                self.starting_shown = true;
                Some(Notice::Starting)
            }
            _ => None,
        }
    }
}

impl Default for NoticeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_DEBOUNCE)
    }
}

/// Forward readiness notices to `sink` until the monitor is dropped
pub async fn watch_notices(
    mut rx: watch::Receiver<ReadinessSnapshot>,
    debounce: Duration,
    sink: impl NoticeSink,
) {
    let mut tracker = NoticeTracker::new(debounce);

    loop {
        let snap = *rx.borrow_and_update();
        if let Some(notice) = tracker.observe(&snap, Instant::now()) {
            sink.notify(notice);
        }

        let deadline = tracker.deadline();
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep_until(deadline) => {
                if let Some(notice) = tracker.poll(Instant::now()) {
                    sink.notify(notice);
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::readiness::monitor::ReadinessMonitor;
    use crate::readiness::policy::RetryPolicy;
    use crate::readiness::probe::testing::ScriptedProbe;

    fn snap(state: ReadinessState, failures: u32, chain: u64) -> ReadinessSnapshot {
        ReadinessSnapshot {
            state,
            attempt: failures + 1,
            failures,
            max_attempts: 3,
            chain,
        }
    }

    const DEBOUNCE: Duration = Duration::from_millis(1200);

    #[test]
    fn test_no_notice_while_first_probe_runs() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        assert_eq!(tracker.observe(&snap(ReadinessState::Checking, 0, 1), t0), None);
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(t0 + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_starting_is_debounced() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        assert_eq!(tracker.deadline(), Some(t0 + DEBOUNCE));
        assert_eq!(tracker.poll(t0 + Duration::from_millis(1000)), None);
        assert_eq!(tracker.poll(t0 + DEBOUNCE), Some(Notice::Starting));
        assert_eq!(tracker.poll(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_fast_recovery_shows_nothing() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        let ready = snap(ReadinessState::Ready, 1, 1);
        assert_eq!(tracker.observe(&ready, t0 + Duration::from_millis(800)), None);
        assert_eq!(tracker.poll(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_starting_shown_once_per_chain() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        assert_eq!(tracker.poll(t0 + DEBOUNCE), Some(Notice::Starting));

        // Later failures in the same chain are not announced
        let t1 = t0 + Duration::from_secs(3);
        tracker.observe(&snap(ReadinessState::Checking, 2, 1), t1);
        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(t1 + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_recovered_after_starting() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        tracker.poll(t0 + DEBOUNCE);
        let ready = snap(ReadinessState::Ready, 2, 1);
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(tracker.observe(&ready, t1), Some(Notice::Recovered));
        assert_eq!(tracker.observe(&ready, t1), None);
    }

    #[test]
    fn test_gave_up_once() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();
        let unreachable = snap(ReadinessState::Unreachable, 3, 1);

        assert_eq!(tracker.observe(&unreachable, t0), Some(Notice::GaveUp));
        assert_eq!(tracker.observe(&unreachable, t0), None);
    }

    #[test]
    fn test_gave_up_cancels_pending_starting() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        let unreachable = snap(ReadinessState::Unreachable, 2, 1);
        assert_eq!(
            tracker.observe(&unreachable, t0 + Duration::from_millis(500)),
            Some(Notice::GaveUp)
        );
        assert_eq!(tracker.poll(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn test_new_chain_can_announce_again() {
        let mut tracker = NoticeTracker::new(DEBOUNCE);
        let t0 = Instant::now();

        tracker.observe(&snap(ReadinessState::Checking, 1, 1), t0);
        tracker.poll(t0 + DEBOUNCE);
        tracker.observe(&snap(ReadinessState::Unreachable, 3, 1), t0 + Duration::from_secs(9));

        let t1 = t0 + Duration::from_secs(20);
        tracker.observe(&snap(ReadinessState::Checking, 1, 2), t1);
        assert_eq!(tracker.poll(t1 + DEBOUNCE), Some(Notice::Starting));
    }

    #[test]
    fn test_notice_levels() {
        assert_eq!(Notice::Starting.level(), NoticeLevel::Info);
        assert_eq!(Notice::Recovered.level(), NoticeLevel::Info);
        assert_eq!(Notice::GaveUp.level(), NoticeLevel::Error);
        assert!(Notice::Starting.message().contains("minute"));
    }

    fn collecting_sink() -> (Arc<Mutex<Vec<(Notice, Instant)>>>, impl NoticeSink) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = move |notice: Notice| sink_seen.lock().push((notice, Instant::now()));
        (seen, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_notices_cold_start() {
        let probe = ScriptedProbe::failing_then_ok(2);
        let policy = RetryPolicy::new(3, Duration::from_secs(2), 1.5).unwrap();
        let monitor = ReadinessMonitor::new(probe, policy);
        let (seen, sink) = collecting_sink();
        let origin = Instant::now();

        let watcher = tokio::spawn(watch_notices(monitor.subscribe(), DEBOUNCE, sink));
        monitor.start();
        monitor.wait_settled().await;
        drop(monitor);
        watcher.await.unwrap();

        let seen: Vec<_> = seen
            .lock()
            .iter()
            .map(|(notice, at)| (*notice, at.duration_since(origin)))
            .collect();
        assert_eq!(
            seen,
            vec![
                (Notice::Starting, DEBOUNCE),
                (Notice::Recovered, Duration::from_secs(5)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_notices_sub_debounce_recovery() {
        let probe = ScriptedProbe::failing_then_ok(1);
        let policy = RetryPolicy::new(3, Duration::from_millis(500), 1.5).unwrap();
        let monitor = ReadinessMonitor::new(probe, policy);
        let (seen, sink) = collecting_sink();

        let watcher = tokio::spawn(watch_notices(monitor.subscribe(), DEBOUNCE, sink));
        monitor.start();
        assert_eq!(monitor.wait_settled().await, ReadinessState::Ready);
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(monitor);
        watcher.await.unwrap();

        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_notices_gave_up() {
        let probe = ScriptedProbe::always_failing();
        let policy = RetryPolicy::new(3, Duration::from_secs(2), 1.5).unwrap();
        let monitor = ReadinessMonitor::new(probe, policy);
        let (seen, sink) = collecting_sink();

        let watcher = tokio::spawn(watch_notices(monitor.subscribe(), DEBOUNCE, sink));
        monitor.start();
        assert_eq!(monitor.wait_settled().await, ReadinessState::Unreachable);
        drop(monitor);
        watcher.await.unwrap();

        let notices: Vec<_> = seen.lock().iter().map(|(n, _)| *n).collect();
        assert_eq!(notices, vec![Notice::Starting, Notice::GaveUp]);
    }
}
