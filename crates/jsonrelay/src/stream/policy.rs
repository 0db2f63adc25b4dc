//! Reconnect backoff and session tuning.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::Visibility;

/// Bounded reconnect backoff.
///
/// The first [`fixed_attempts`](Self::fixed_attempts) retries wait the base
/// delay for the current [`Visibility`]; after that the delay doubles per
/// attempt up to [`max_backoff`](Self::max_backoff).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Failures tolerated before giving up (`MaxRetriesExceeded`).
    pub max_attempts: u32,
    /// Base delay while the host is visible.
    pub foreground_base: Duration,
    /// Base delay while the host is hidden.
    pub background_base: Duration,
    /// Attempts that use the base delay before doubling starts.
    pub fixed_attempts: u32,
    /// Upper bound for the doubled delay.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            foreground_base: Duration::from_secs(1),
            background_base: Duration::from_secs(5),
            fixed_attempts: 3,
            max_backoff: Duration::from_secs(30),
            jitter: Duration::ZERO,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use jsonrelay::{Visibility, stream::ReconnectPolicy};
    ///
    /// let policy = ReconnectPolicy::default();
    /// let fg = |n| policy.delay_for_attempt(n, Visibility::Foreground);
    /// assert_eq!(fg(1), Duration::from_secs(1));
    /// assert_eq!(fg(3), Duration::from_secs(1));
    /// assert_eq!(fg(4), Duration::from_secs(2));
    /// assert_eq!(fg(7), Duration::from_secs(16));
    /// assert_eq!(fg(8), Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, visibility: Visibility) -> Duration {
        let base = match visibility {
            Visibility::Foreground => self.foreground_base,
            Visibility::Background => self.background_base,
        };
        let mut delay = base;
        for _ in self.fixed_attempts..attempt {
            delay = delay.saturating_mul(2).min(self.max_backoff);
        }
        delay + jitter_duration(self.jitter, attempt)
    }
}

fn jitter_duration(max_jitter: Duration, attempt: u32) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }

    let limit_nanos = u64::try_from(max_jitter.as_nanos()).unwrap_or(u64::MAX);
    let now_nanos = u64::from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    let mixed = now_nanos ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    Duration::from_nanos(mixed % limit_nanos.saturating_add(1))
}

/// Tuning for every session a [`Multiplexer`](super::Multiplexer) creates.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Retry backoff.
    pub policy: ReconnectPolicy,
    /// While hidden, keep retrying only if the last good connection is at
    /// least this old (or there never was one).
    pub background_retry_after: Duration,
    /// How often the health check runs.
    pub health_check_interval: Duration,
    /// Sessions in `Error` longer than this are re-attempted by the health
    /// check.
    pub stale_after: Duration,
    /// Retries the health check grants a stale session.
    pub health_check_attempts: u32,
    /// Reconnect right away after a normal close instead of parking.
    pub reconnect_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            background_retry_after: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(60),
            health_check_attempts: 3,
            reconnect_on_close: false,
        }
    }
}
