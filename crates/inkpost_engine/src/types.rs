use std::fmt;
use std::path::PathBuf;

use inkpost_core::{DraftMode, PublishStage};

/// Progress and notices emitted while copying or publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishEvent {
    Stage(PublishStage),
    UploadProgress {
        index: usize,
        total: usize,
        filename: String,
    },
    UploadSkipped {
        filename: String,
        reason: String,
    },
    /// User-facing message; backend-down notices are already throttled.
    Notice(String),
    Copied {
        target: &'static str,
    },
    DraftSubmitted {
        mode: DraftMode,
        title: String,
    },
    BatchItemStarted {
        index: usize,
        total: usize,
        path: PathBuf,
    },
    BatchItemFinished {
        index: usize,
        total: usize,
        path: PathBuf,
        success: bool,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: PublishEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: PublishEvent) {}
}

/// Credentials for one platform account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub app_id: String,
    pub app_secret: String,
}

/// Where a failed copy or publish attempt ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preservation {
    /// Rendered content reached the clipboard.
    Clipboard,
    /// Clipboard fallback was attempted and failed.
    Lost,
    /// No fallback was needed, nothing was attempted.
    NotAttempted,
}

impl fmt::Display for Preservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preservation::Clipboard => write!(f, "content copied to clipboard"),
            Preservation::Lost => write!(f, "clipboard fallback failed"),
            Preservation::NotAttempted => write!(f, "no fallback attempted"),
        }
    }
}
