use std::time::{Duration, Instant};

/// Lower-cased fragments that identify a connectivity failure rather than a
/// platform-side rejection.
pub const TRANSPORT_SIGNATURES: &[&str] = &[
    "failed to fetch",
    "fetch failed",
    "networkerror",
    "err_connection_refused",
    "connection refused",
    "connection reset",
    "cors",
    "aborted",
    "timed out",
    "timeout",
    "dns error",
    "error sending request",
];

pub fn looks_like_transport_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSPORT_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Unknown,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub state: BackendState,
    pub last_failure_at: Option<Instant>,
    pub last_notice_at: Option<Instant>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            state: BackendState::Unknown,
            last_failure_at: None,
            last_notice_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub cooldown: Duration,
    pub notice_interval: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            notice_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    ShortCircuit { remaining: Duration },
}

/// Guards network calls against a backend that recently refused connections.
///
/// `Unknown -> Available -> Unavailable -> (cooldown) -> Unknown`
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    health: BackendHealth,
    policy: BreakerPolicy,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            health: BackendHealth::default(),
            policy,
        }
    }

    pub fn health(&self) -> &BackendHealth {
        &self.health
    }

    pub fn state(&self) -> BackendState {
        self.health.state
    }

    pub fn policy(&self) -> BreakerPolicy {
        self.policy
    }

    /// Decides whether a network call may go out at `now`.
    pub fn admit(&mut self, now: Instant) -> Admission {
        if self.health.state != BackendState::Unavailable {
            return Admission::Proceed;
        }
        let elapsed = self
            .health
            .last_failure_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(self.policy.cooldown);
        if elapsed < self.policy.cooldown {
            Admission::ShortCircuit {
                remaining: self.policy.cooldown - elapsed,
            }
        } else {
            self.health.state = BackendState::Unknown;
            Admission::Proceed
        }
    }

    pub fn record_success(&mut self) {
        self.health.state = BackendState::Available;
    }

    pub fn record_transport_failure(&mut self, now: Instant) {
        self.health.state = BackendState::Unavailable;
        self.health.last_failure_at = Some(now);
    }

    /// Returns true at most once per notice interval.
    pub fn should_notify(&mut self, now: Instant) -> bool {
        let allowed = match self.health.last_notice_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.policy.notice_interval,
        };
        if allowed {
            self.health.last_notice_at = Some(now);
        }
        allowed
    }
}
