//! Minimum-interval gate for rate-limited external calls.
//!
//! Scans pass every oracle call (and the runner every task) through a
//! `Pacer`; the first call goes out immediately, later ones wait until the
//! policy's interval has elapsed since the previous one.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// How far apart consecutive calls must be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    min_interval: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from_millis(1000)
    }
}

impl PacingPolicy {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// No waiting at all (tests, one-off calls)
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn is_disabled(&self) -> bool {
        self.min_interval.is_zero()
    }

    pub fn pacer(&self) -> Pacer {
        Pacer::new(*self)
    }
}

/// Stateful gate enforcing a `PacingPolicy`
#[derive(Debug)]
pub struct Pacer {
    policy: PacingPolicy,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self { policy, last: None }
    }

    /// Wait until the next call is allowed, then record it
    pub async fn ready(&mut self) {
        if let Some(last) = self.last {
            let next = last + self.policy.min_interval;
            if Instant::now() < next {
                debug!(
                    wait_ms = next.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Pacing before next call"
                );
                tokio::time::sleep_until(next).await;
            }
        }
        self.last = Some(Instant::now());
    }

    /// Time until the gate opens again (zero if open)
    pub fn remaining(&self) -> Duration {
        match self.last {
            Some(last) => (last + self.policy.min_interval).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_is_immediate() {
        let mut pacer = PacingPolicy::from_millis(10_000).pacer();
        let start = Instant::now();
        pacer.ready().await;
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(pacer.remaining() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_second_call_waits_for_interval() {
        let mut pacer = PacingPolicy::from_millis(50).pacer();
        pacer.ready().await;
        let start = Instant::now();
        pacer.ready().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_disabled_policy_never_waits() {
        let policy = PacingPolicy::disabled();
        assert!(policy.is_disabled());

        let mut pacer = policy.pacer();
        let start = Instant::now();
        for _ in 0..5 {
            pacer.ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }
}
