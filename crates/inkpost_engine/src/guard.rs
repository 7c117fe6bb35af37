use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use inkpost_core::{Admission, BackendState, BreakerPolicy, CircuitBreaker};
use inkpost_logging::ink_debug;

use crate::api::ApiError;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Process-wide circuit breaker consulted before every backend call.
pub struct BackendGuard {
    breaker: Mutex<CircuitBreaker>,
    clock: Arc<dyn Clock>,
}

impl BackendGuard {
    pub fn new(policy: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            breaker: Mutex::new(CircuitBreaker::new(policy)),
            clock,
        }
    }

    fn with_breaker<T>(&self, f: impl FnOnce(&mut CircuitBreaker) -> T) -> T {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut breaker)
    }

    pub fn admit(&self) -> Admission {
        let now = self.clock.now();
        self.with_breaker(|breaker| breaker.admit(now))
    }

    /// Feeds a call result back. Application errors leave the state alone.
    pub fn observe<T>(&self, result: &Result<T, ApiError>) {
        match result {
            Ok(_) => self.with_breaker(CircuitBreaker::record_success),
            Err(ApiError::Transport(message)) => {
                ink_debug!("Backend marked unavailable: {message}");
                let now = self.clock.now();
                self.with_breaker(|breaker| breaker.record_transport_failure(now));
            }
            Err(_) => {}
        }
    }

    pub fn should_notify(&self) -> bool {
        let now = self.clock.now();
        self.with_breaker(|breaker| breaker.should_notify(now))
    }

    pub fn state(&self) -> BackendState {
        self.with_breaker(|breaker| breaker.state())
    }
}
