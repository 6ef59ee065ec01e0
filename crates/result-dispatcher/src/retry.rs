//! Cycle gating: external suspension plus the connectivity quiet period.

use crate::remote::ConnectivityError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Global "delivery disabled" switch owned by the host.
pub trait SuspensionSignal: Send + Sync {
    fn is_suspended(&self) -> bool;
}

/// Atomic suspension switch.
#[derive(Debug, Default)]
pub struct SuspensionFlag {
    suspended: AtomicBool,
}

impl SuspensionFlag {
    pub fn new(suspended: bool) -> Self {
        Self {
            suspended: AtomicBool::new(suspended),
        }
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }
}

impl SuspensionSignal for SuspensionFlag {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

/// Why a cycle did no work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The suspension signal is set.
    Suspended,
    /// A connectivity failure put the dispatcher in a quiet period.
    QuietPeriod { until: DateTime<Utc> },
    /// No server has been configured yet.
    NotConfigured,
}

/// Quiet-period state shared by all cycles of one dispatcher.
///
/// Consecutive connectivity failures lengthen the quiet period:
/// `base * 2^(failures - 1)`, capped at `max`. A successful validation
/// resets the escalation.
pub struct RetryModel {
    suspension: Arc<dyn SuspensionSignal>,
    quiet_period_base: Duration,
    quiet_period_max: Duration,
    quiet_until: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl RetryModel {
    pub fn new(
        suspension: Arc<dyn SuspensionSignal>,
        quiet_period_base: Duration,
        quiet_period_max: Duration,
    ) -> Self {
        Self {
            suspension,
            quiet_period_base,
            quiet_period_max: quiet_period_max.max(quiet_period_base),
            quiet_until: None,
            consecutive_failures: 0,
        }
    }

    /// Reason to skip the cycle at `now`, if any. An elapsed quiet period is
    /// cleared here.
    pub fn skip_reason(&mut self, now: DateTime<Utc>) -> Option<SkipReason> {
        if self.suspension.is_suspended() {
            return Some(SkipReason::Suspended);
        }

        match self.quiet_until {
            Some(until) if now < until => Some(SkipReason::QuietPeriod { until }),
            Some(_) => {
                self.quiet_until = None;
                None
            }
            None => None,
        }
    }

    pub fn should_skip_cycle(&mut self, now: DateTime<Utc>) -> bool {
        self.skip_reason(now).is_some()
    }

    /// Start (or extend) the quiet period after a failed validation.
    /// Returns the end of the quiet period.
    pub fn on_connectivity_failure(
        &mut self,
        now: DateTime<Utc>,
        error: &ConnectivityError,
    ) -> DateTime<Utc> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let quiet = compute_quiet_period(
            self.consecutive_failures,
            self.quiet_period_base,
            self.quiet_period_max,
        );
        let until = now
            .checked_add_signed(quiet)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.quiet_until = Some(until);

        warn!(
            kind = error.kind(),
            error = %error,
            consecutive_failures = self.consecutive_failures,
            quiet_secs = quiet.num_seconds(),
            "Server validation failed, deferring delivery"
        );
        until
    }

    pub fn on_connectivity_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                previous_failures = self.consecutive_failures,
                "Server validation recovered"
            );
        }
        self.consecutive_failures = 0;
        self.quiet_until = None;
    }

    pub fn quiet_until(&self) -> Option<DateTime<Utc>> {
        self.quiet_until
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Quiet period after `failures` consecutive connectivity failures.
/// Saturates instead of overflowing for very large settings.
fn compute_quiet_period(failures: u32, base: Duration, max: Duration) -> chrono::Duration {
    if failures == 0 {
        return chrono::Duration::zero();
    }

    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let shift = failures.saturating_sub(1);
    let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

    i64::try_from(delay_ms)
        .ok()
        .and_then(chrono::Duration::try_milliseconds)
        .unwrap_or(chrono::Duration::MAX)
}
