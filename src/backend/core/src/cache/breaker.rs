//! Circuit breaker guarding the remote cache tier.
//!
//! After `failure_threshold` consecutive failures the remote tier is skipped
//! entirely until `recovery_timeout` has passed; the next call then runs as a
//! half-open trial that either closes or re-opens the circuit.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls allowed
    Closed,
    /// Too many failures - calls skipped
    Open,
    /// Testing if the remote recovered
    HalfOpen,
}

pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    opened_at: RwLock<Option<Instant>>,
    recovery_timeout: Duration,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            opened_at: RwLock::new(None),
            recovery_timeout: Duration::from_secs(30),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Check if a remote call may be attempted, moving Open to HalfOpen once
    /// the recovery timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        if *self.state.read() != CircuitState::Open {
            return true;
        }

        let mut state = self.state.write();
        if *state != CircuitState::Open {
            return true;
        }
        let opened_at = *self.opened_at.read();
        let ready = opened_at.map_or(true, |opened| opened.elapsed() >= self.recovery_timeout);
        if ready {
            *state = CircuitState::HalfOpen;
            tracing::info!("Remote cache circuit half-open, trying remote tier again");
        }
        ready
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);

        let mut state = self.state.write();
        if *state != CircuitState::Closed {
            *state = CircuitState::Closed;
            *self.opened_at.write() = None;
            tracing::info!("Remote cache circuit closed after successful call");
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.write() = Some(Instant::now());
                tracing::warn!("Remote cache circuit re-opened after failed recovery attempt");
            }
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.failure_threshold {
                    *state = CircuitState::Open;
                    *self.opened_at.write() = Some(Instant::now());
                    tracing::warn!(
                        failures = failures,
                        threshold = self.failure_threshold,
                        "Remote cache circuit opened due to consecutive failures"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without triggering the Open to HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            failure_threshold: self.failure_threshold,
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub total_successes: u64,
    pub total_failures: u64,
}
