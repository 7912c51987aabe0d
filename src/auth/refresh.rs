// Refresh policy primitives

use chrono::{DateTime, Duration, Utc};

/// Default minimum time between two refresh round-trips
pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 30;

/// Default safety window before credential expiry
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 15;

/// Result of `ensure_fresh_credentials`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub refreshed: bool,
}

impl RefreshOutcome {
    pub const SKIPPED: RefreshOutcome = RefreshOutcome { refreshed: false };
    pub const REFRESHED: RefreshOutcome = RefreshOutcome { refreshed: true };
}

/// Minimum-interval gate against refresh storms
///
/// Only successful refreshes are recorded. The guard lives with its manager
/// and is not shared or persisted.
#[derive(Debug, Clone)]
pub struct RefreshGuard {
    min_interval: Duration,
    last_refresh: Option<DateTime<Utc>>,
}

impl RefreshGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_refresh: None,
        }
    }

    /// Whether a refresh may run at `now`
    pub fn allows_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now - last >= self.min_interval,
        }
    }

    pub fn allows(&self) -> bool {
        self.allows_at(Utc::now())
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.last_refresh = Some(at);
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Zero makes every call eligible
    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// Forget the last refresh so the next call is eligible
    pub fn reset(&mut self) {
        self.last_refresh = None;
    }
}

impl Default for RefreshGuard {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_MIN_INTERVAL_SECS))
    }
}
