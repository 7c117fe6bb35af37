mod common;

use std::sync::Mutex;
use std::time::Duration;

use common::{account, harness, write_note};
use inkpost_engine::{
    batch_publish, list_markdown_files, AccountBook, BatchJob, CancellationSignal, EngineSettings,
    ProgressSink, PublishEvent,
};
use pretty_assertions::assert_eq;

/// Requests cancellation as soon as the first item finishes.
struct CancelAfterFirst {
    signal: CancellationSignal,
    finished: Mutex<Vec<usize>>,
}

impl ProgressSink for CancelAfterFirst {
    fn emit(&self, event: PublishEvent) {
        if let PublishEvent::BatchItemFinished { index, .. } = event {
            self.finished.lock().unwrap().push(index);
            self.signal.cancel();
        }
    }
}

fn three_notes(dir: &std::path::Path) {
    write_note(dir, "b-second.md", "Two.\n", &[]);
    write_note(dir, "a-first.md", "One.\n", &[]);
    write_note(dir, "c-third.md", "Three.\n", &[]);
    std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
}

#[tokio::test]
async fn lists_markdown_files_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    three_notes(dir.path());
    let files = list_markdown_files(dir.path()).await.unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a-first.md", "b-second.md", "c-third.md"]);
}

#[tokio::test]
async fn cancellation_after_first_item_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    three_notes(dir.path());
    let files = list_markdown_files(dir.path()).await.unwrap();
    let h = harness(EngineSettings::default());
    let book = AccountBook::new(vec![account()], Some("main".into()));
    let signal = CancellationSignal::new();
    let sink = CancelAfterFirst {
        signal: signal.clone(),
        finished: Mutex::new(Vec::new()),
    };

    let report = batch_publish(
        h.engine.pipeline(),
        h.engine.publisher(),
        BatchJob {
            files: &files,
            accounts: &book,
            requested_account: None,
            delay: Duration::from_millis(5),
        },
        &signal,
        &sink,
    )
    .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.processed, 1);
    assert_eq!(report.succeeded, 1);
    assert!(report.cancelled);
    assert_eq!(report.remaining(), 2);
    assert_eq!(*sink.finished.lock().unwrap(), vec![1]);
    assert_eq!(h.api.submitted.lock().unwrap()[0].title, "a-first");
}

#[tokio::test]
async fn batch_without_cancellation_reports_every_item() {
    let dir = tempfile::tempdir().unwrap();
    three_notes(dir.path());
    let files = list_markdown_files(dir.path()).await.unwrap();
    let h = harness(EngineSettings::default());
    let book = AccountBook::new(vec![account()], None);
    let sink = common::RecordingSink::default();

    let report = batch_publish(
        h.engine.pipeline(),
        h.engine.publisher(),
        BatchJob {
            files: &files,
            accounts: &book,
            requested_account: Some("wx123"),
            delay: Duration::ZERO,
        },
        &CancellationSignal::new(),
        &sink,
    )
    .await;

    assert!(report.is_complete());
    assert_eq!((report.succeeded, report.failed), (3, 0));
    assert_eq!(h.api.submitted.lock().unwrap().len(), 3);

    let finished: Vec<_> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            PublishEvent::BatchItemFinished {
                index,
                total,
                success,
                ..
            } => Some((*index, *total, *success)),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(1, 3, true), (2, 3, true), (3, 3, true)]);
}
