use thiserror::Error;

use crate::DraftMode;

/// Stages of a single publish attempt, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishStage {
    Idle,
    AcquiringToken,
    CheckingDraftExistence,
    UploadingAssets,
    ResolvingCover,
    BuildingPayload,
    SubmittingDraft,
    Done,
    Failed,
}

impl PublishStage {
    /// The successor on the happy path, `None` for terminal stages.
    pub fn next(self) -> Option<PublishStage> {
        match self {
            PublishStage::Idle => Some(PublishStage::AcquiringToken),
            PublishStage::AcquiringToken => Some(PublishStage::CheckingDraftExistence),
            PublishStage::CheckingDraftExistence => Some(PublishStage::UploadingAssets),
            PublishStage::UploadingAssets => Some(PublishStage::ResolvingCover),
            PublishStage::ResolvingCover => Some(PublishStage::BuildingPayload),
            PublishStage::BuildingPayload => Some(PublishStage::SubmittingDraft),
            PublishStage::SubmittingDraft => Some(PublishStage::Done),
            PublishStage::Done | PublishStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PublishStage::Done | PublishStage::Failed)
    }

    /// Any live stage may fail; otherwise only the happy-path successor is legal.
    pub fn can_transition_to(self, to: PublishStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PublishStage::Failed || self.next() == Some(to)
    }

    pub fn label(self) -> &'static str {
        match self {
            PublishStage::Idle => "idle",
            PublishStage::AcquiringToken => "acquiring token",
            PublishStage::CheckingDraftExistence => "checking draft",
            PublishStage::UploadingAssets => "uploading assets",
            PublishStage::ResolvingCover => "resolving cover",
            PublishStage::BuildingPayload => "building payload",
            PublishStage::SubmittingDraft => "submitting draft",
            PublishStage::Done => "done",
            PublishStage::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid publish transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: PublishStage,
    pub to: PublishStage,
}

/// Bookkeeping for one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAttempt {
    stage: PublishStage,
    failed_at: Option<PublishStage>,
    mode: Option<DraftMode>,
    history: Vec<PublishStage>,
}

impl Default for PublishAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishAttempt {
    pub fn new() -> Self {
        Self {
            stage: PublishStage::Idle,
            failed_at: None,
            mode: None,
            history: vec![PublishStage::Idle],
        }
    }

    pub fn stage(&self) -> PublishStage {
        self.stage
    }

    pub fn history(&self) -> &[PublishStage] {
        &self.history
    }

    pub fn mode(&self) -> Option<&DraftMode> {
        self.mode.as_ref()
    }

    pub fn set_mode(&mut self, mode: DraftMode) {
        self.mode = Some(mode);
    }

    /// The stage that was live when the attempt failed.
    pub fn failed_at(&self) -> Option<PublishStage> {
        self.failed_at
    }

    pub fn advance(&mut self, to: PublishStage) -> Result<PublishStage, TransitionError> {
        if !self.stage.can_transition_to(to) {
            return Err(TransitionError {
                from: self.stage,
                to,
            });
        }
        if to == PublishStage::Failed {
            self.failed_at = Some(self.stage);
        }
        self.stage = to;
        self.history.push(to);
        Ok(to)
    }

    /// Moves to `Failed` from any live stage and returns the stage that failed.
    /// Calling it on a terminal attempt leaves the attempt untouched.
    pub fn fail(&mut self) -> PublishStage {
        let current = self.stage;
        if self.advance(PublishStage::Failed).is_err() {
            return self.failed_at.unwrap_or(current);
        }
        current
    }

    /// True once the upload loop has been entered.
    pub fn uploads_started(&self) -> bool {
        self.history.contains(&PublishStage::UploadingAssets)
    }
}
