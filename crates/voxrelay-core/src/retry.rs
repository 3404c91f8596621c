//! Per-chunk bounded retry state machine.
//!
//! The machine only tracks state and computes delays; sleeping is the
//! caller's job, so the schedule can be checked without a runtime.

use std::time::Duration;

/// Retry and pacing parameters for chunk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_step: Duration,
    /// Pause after a successful chunk that is not the last.
    pub inter_chunk_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(3000),
            backoff_step: Duration::from_millis(2000),
            inter_chunk_delay: Duration::from_millis(3000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base + retry × step`.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base + self.backoff_step * retry
    }

    /// A policy with every delay zeroed.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_step: Duration::ZERO,
            inter_chunk_delay: Duration::ZERO,
        }
    }
}

/// Where one chunk's request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    /// Attempt number, 1-based.
    InFlight(u32),
    /// Waiting out the backoff before retry `n`.
    Retrying(u32),
    Succeeded,
    Failed,
}

impl ChunkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Drives one chunk through `Pending → InFlight → {Succeeded, Retrying, Failed}`.
#[derive(Debug, Clone)]
pub struct ChunkRetry {
    policy: RetryPolicy,
    state: ChunkState,
    attempts: u32,
}

impl ChunkRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ChunkState::Pending,
            attempts: 0,
        }
    }

    /// Begin the next attempt. Returns its 1-based number, or `None` once
    /// the chunk has reached a terminal state.
    pub fn start(&mut self) -> Option<u32> {
        match self.state {
            ChunkState::Pending | ChunkState::Retrying(_) => {
                self.attempts += 1;
                self.state = ChunkState::InFlight(self.attempts);
                Some(self.attempts)
            }
            ChunkState::InFlight(n) => Some(n),
            ChunkState::Succeeded | ChunkState::Failed => None,
        }
    }

    pub fn succeed(&mut self) {
        self.state = ChunkState::Succeeded;
    }

    /// Record a failed attempt. Returns the backoff to wait before the next
    /// attempt, or `None` when retries are exhausted and the chunk has failed.
    pub fn fail(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts.max(1) {
            self.state = ChunkState::Failed;
            return None;
        }
        let retry = self.attempts;
        self.state = ChunkState::Retrying(retry);
        Some(self.policy.backoff(retry))
    }

    /// Fail immediately without further retries.
    pub fn abandon(&mut self) {
        self.state = ChunkState::Failed;
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(5000));
        assert_eq!(policy.backoff(2), Duration::from_millis(7000));
        assert_eq!(policy.inter_chunk_delay, Duration::from_millis(3000));
    }

    #[test]
    fn succeeds_first_try() {
        let mut retry = ChunkRetry::new(RetryPolicy::default());
        assert_eq!(retry.state(), ChunkState::Pending);
        assert_eq!(retry.start(), Some(1));
        assert_eq!(retry.state(), ChunkState::InFlight(1));
        retry.succeed();
        assert!(retry.state().is_terminal());
        assert_eq!(retry.start(), None);
        assert_eq!(retry.attempts(), 1);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut retry = ChunkRetry::new(RetryPolicy::default());
        let mut delays = Vec::new();
        while retry.start().is_some() {
            match retry.fail() {
                Some(delay) => delays.push(delay.as_millis()),
                None => break,
            }
        }
        assert_eq!(delays, vec![5000, 7000]);
        assert_eq!(retry.state(), ChunkState::Failed);
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn retrying_state_carries_retry_number() {
        let mut retry = ChunkRetry::new(RetryPolicy::default());
        retry.start();
        retry.fail();
        assert_eq!(retry.state(), ChunkState::Retrying(1));
        assert_eq!(retry.start(), Some(2));
        retry.succeed();
        assert_eq!(retry.attempts(), 2);
    }

    #[test]
    fn abandon_skips_remaining_attempts() {
        let mut retry = ChunkRetry::new(RetryPolicy::default());
        retry.start();
        retry.abandon();
        assert_eq!(retry.state(), ChunkState::Failed);
        assert_eq!(retry.start(), None);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut retry = ChunkRetry::new(RetryPolicy::immediate(0));
        assert_eq!(retry.start(), Some(1));
        assert_eq!(retry.fail(), None);
    }
}
