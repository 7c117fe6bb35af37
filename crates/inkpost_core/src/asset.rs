use std::path::PathBuf;

use thiserror::Error;

/// Upload lifecycle of a local asset. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

impl UploadState {
    pub fn can_advance_to(self, next: UploadState) -> bool {
        matches!(
            (self, next),
            (UploadState::Pending, UploadState::Uploading)
                | (UploadState::Uploading, UploadState::Uploaded)
                | (UploadState::Uploading, UploadState::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("asset {path:?} cannot move from {from:?} to {to:?}")]
pub struct AssetTransitionError {
    pub path: PathBuf,
    pub from: UploadState,
    pub to: UploadState,
}

/// A local image referenced by a rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// Resolved file on disk.
    pub path: PathBuf,
    /// Placeholder `src` written into the rendered HTML.
    pub res_url: String,
    /// Link text as authored, used to locate the surrounding section.
    pub reference: String,
    state: UploadState,
    remote_id: Option<String>,
    remote_url: Option<String>,
}

impl LocalAsset {
    pub fn new(path: PathBuf, res_url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            path,
            res_url: res_url.into(),
            reference: reference.into(),
            state: UploadState::Pending,
            remote_id: None,
            remote_url: None,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.state == UploadState::Pending && self.remote_url.is_none()
    }

    pub fn begin_upload(&mut self) -> Result<(), AssetTransitionError> {
        self.advance(UploadState::Uploading)
    }

    pub fn mark_uploaded(
        &mut self,
        remote_id: impl Into<String>,
        remote_url: impl Into<String>,
    ) -> Result<(), AssetTransitionError> {
        self.advance(UploadState::Uploaded)?;
        self.remote_id = Some(remote_id.into());
        self.remote_url = Some(remote_url.into());
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<(), AssetTransitionError> {
        self.advance(UploadState::Failed)
    }

    fn advance(&mut self, to: UploadState) -> Result<(), AssetTransitionError> {
        if !self.state.can_advance_to(to) {
            return Err(AssetTransitionError {
                path: self.path.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
