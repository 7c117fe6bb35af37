/// Why a copy attempt fell back to a clipboard-only copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoAccount,
    BackendDown,
    TokenFailed,
    None,
}

/// Outcome of a copy attempt that may or may not have uploaded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishResult {
    pub uploaded: bool,
    pub reason: FallbackReason,
}

impl PublishResult {
    pub fn uploaded() -> Self {
        Self {
            uploaded: true,
            reason: FallbackReason::None,
        }
    }

    pub fn fallback(reason: FallbackReason) -> Self {
        Self {
            uploaded: false,
            reason,
        }
    }
}

/// Whether the submit step creates a new draft or rewrites an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftMode {
    Create,
    Update { media_id: String, index: u32 },
}

/// Tally of a batch publish run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed == self.total
    }
}
