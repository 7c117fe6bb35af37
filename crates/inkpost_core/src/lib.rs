//! Inkpost core: pure state machines for publishing.
//!
//! Nothing in this crate performs I/O or reads the clock; callers pass the
//! current `Instant` in so every transition is deterministic under test.
mod asset;
mod breaker;
mod result;
mod stage;

pub use asset::{AssetTransitionError, LocalAsset, UploadState};
pub use breaker::{
    looks_like_transport_failure, Admission, BackendHealth, BackendState, BreakerPolicy,
    CircuitBreaker, TRANSPORT_SIGNATURES,
};
pub use result::{BatchReport, DraftMode, FallbackReason, PublishResult};
pub use stage::{PublishAttempt, PublishStage, TransitionError};
