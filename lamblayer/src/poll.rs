//! Retry schedule for waiting on the remote package build.
//!
//! The build service hands back a pre-signed URL before the bundle exists.
//! [`PollPolicy`] describes how often that URL is retried: the delay starts at
//! five seconds, doubles after each miss up to a ceiling, and the whole wait
//! is bounded by a timeout. Sleeping goes through [`Sleeper`] so tests can
//! drive the schedule without waiting.

use std::time::Duration;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound on the delay between two retries.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
/// Total time spent waiting before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(900);
/// Shortest delay ever handed out, whatever the policy says.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound on any single delay, except that no delay is shorter
    /// than [`MIN_INTERVAL`].
    pub max_interval: Duration,
    /// Factor applied to the delay after each miss. `0` is treated as `1`.
    pub multiplier: u32,
    /// Total waiting budget.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: 2,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PollPolicy {
    /// Default policy with a different overall timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Start a fresh schedule.
    #[must_use]
    pub const fn schedule(&self) -> Backoff {
        Backoff {
            policy: *self,
            next: self.initial_interval,
            elapsed: Duration::ZERO,
        }
    }
}

/// Running state of one poll loop.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lamblayer::poll::PollPolicy;
///
/// let policy = PollPolicy {
///     initial_interval: Duration::from_secs(5),
///     max_interval: Duration::from_secs(12),
///     multiplier: 2,
///     timeout: Duration::from_secs(30),
/// };
/// let delays: Vec<u64> = std::iter::from_fn({
///     let mut backoff = policy.schedule();
///     move || backoff.next_delay().map(|d| d.as_secs())
/// })
/// .collect();
/// assert_eq!(delays, vec![5, 10, 12, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: PollPolicy,
    next: Duration,
    elapsed: Duration,
}

impl Backoff {
    /// The next delay to wait, or `None` once the timeout is spent.
    ///
    /// The returned delay is counted as elapsed and never overshoots the
    /// timeout. Delays are at least [`MIN_INTERVAL`] apart from the final
    /// one, so any finite timeout is eventually spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let remaining = self.policy.timeout.saturating_sub(self.elapsed);
        if remaining.is_zero() {
            return None;
        }
        let delay = self.next.max(MIN_INTERVAL).min(remaining);
        self.elapsed += delay;
        self.next = self
            .next
            .saturating_mul(self.policy.multiplier.max(1))
            .min(self.policy.max_interval);
        Some(delay)
    }

    /// Total delay handed out so far.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Blocking pause between poll attempts.
pub trait Sleeper {
    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
