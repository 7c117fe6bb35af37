use std::path::PathBuf;

use inkpost_core::{BatchReport, LocalAsset, UploadState};

fn asset() -> LocalAsset {
    LocalAsset::new(PathBuf::from("notes/a.png"), "inkpost://local/0", "a.png")
}

#[test]
fn upload_state_moves_forward_only() {
    let mut asset = asset();
    assert!(asset.is_pending());

    asset.begin_upload().unwrap();
    assert_eq!(asset.state(), UploadState::Uploading);
    asset.mark_uploaded("mid", "https://cdn/a.png").unwrap();
    assert_eq!(asset.state(), UploadState::Uploaded);
    assert_eq!(asset.remote_url(), Some("https://cdn/a.png"));

    let err = asset.begin_upload().unwrap_err();
    assert_eq!(err.from, UploadState::Uploaded);
    assert_eq!(err.to, UploadState::Uploading);
    assert!(!asset.is_pending());
}

#[test]
fn failed_asset_cannot_be_marked_uploaded() {
    let mut asset = asset();
    asset.begin_upload().unwrap();
    asset.mark_failed().unwrap();

    assert!(asset.mark_uploaded("mid", "url").is_err());
    assert_eq!(asset.state(), UploadState::Failed);
    assert_eq!(asset.remote_id(), None);
}

#[test]
fn pending_cannot_jump_to_uploaded() {
    let mut asset = asset();
    assert!(asset.mark_uploaded("mid", "url").is_err());
    assert!(asset.mark_failed().is_err());
    assert_eq!(asset.state(), UploadState::Pending);
}

#[test]
fn batch_report_counts_partial_runs() {
    let mut report = BatchReport::new(3);
    report.record_success();
    report.mark_cancelled();

    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining(), 2);
    assert!(!report.is_complete());
}
