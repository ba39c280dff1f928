//! Suppression of identical failure reports
//!
//! Every distinct [`ReportKey`] passes once; repeats are suppressed until the whole
//! set is cleared, which happens on the first check made more than one window after
//! the previous reset.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use super::report::{FailureReport, ReportKey};
use crate::config::DEFAULT_RATE_LIMIT_WINDOW;

#[derive(Debug)]
struct SeenReports {
    keys: HashSet<ReportKey>,
    last_reset: SystemTime,
}

/// Daily de-duplication of failure reports
#[derive(Debug)]
pub struct ReportRateLimiter {
    window: Duration,
    state: Mutex<SeenReports>,
}

impl Default for ReportRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_WINDOW)
    }
}

impl ReportRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, SystemTime::now())
    }

    /// Limiter whose current window began at `last_reset`
    pub fn starting_at(window: Duration, last_reset: SystemTime) -> Self {
        Self {
            window,
            state: Mutex::new(SeenReports {
                keys: HashSet::new(),
                last_reset,
            }),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, SeenReports> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Report rate limiter lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// `true` if an identical report already went out in the current window.
    /// Otherwise the report is recorded and `false` is returned.
    pub fn should_suppress(&self, report: &FailureReport) -> bool {
        self.should_suppress_at(report, SystemTime::now())
    }

    pub fn should_suppress_at(&self, report: &FailureReport, now: SystemTime) -> bool {
        let mut state = self.lock();

        // A clock that went backwards counts as no time elapsed
        let elapsed = now.duration_since(state.last_reset).unwrap_or_default();
        if elapsed > self.window {
            tracing::debug!("Clearing {} rate-limited report(s)", state.keys.len());
            state.keys.clear();
            state.last_reset = now;
        }

        !state.keys.insert(report.rate_limit_key())
    }

    /// Number of distinct reports seen in the current window
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
