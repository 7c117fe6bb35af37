use std::path::{Path, PathBuf};
use std::time::Duration;

use inkpost_core::BatchReport;
use inkpost_logging::{ink_info, ink_warn};
use tokio_util::sync::CancellationToken;

use crate::accounts::AccountBook;
use crate::publish::{PublishRequest, Publisher};
use crate::render::Pipeline;
use crate::source::SourceDocument;
use crate::{ProgressSink, PublishEvent};

/// Shared stop flag for batch runs. Checked between items only; a publish
/// already in flight always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Markdown files directly inside `dir`, sorted by name.
pub async fn list_markdown_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_markdown = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
        if is_markdown && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub struct BatchJob<'a> {
    pub files: &'a [PathBuf],
    pub accounts: &'a AccountBook,
    pub requested_account: Option<&'a str>,
    pub delay: Duration,
}

/// Publishes each file in turn as a draft.
pub async fn batch_publish(
    pipeline: &Pipeline,
    publisher: &Publisher,
    job: BatchJob<'_>,
    signal: &CancellationSignal,
    sink: &dyn ProgressSink,
) -> BatchReport {
    let total = job.files.len();
    let mut report = BatchReport::new(total);

    for (position, path) in job.files.iter().enumerate() {
        if !job.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(job.delay) => {}
                _ = signal.cancelled() => {}
            }
        }
        if signal.is_cancelled() {
            ink_info!("Batch cancelled with {} of {total} processed", report.processed);
            report.mark_cancelled();
            break;
        }

        let index = position + 1;
        sink.emit(PublishEvent::BatchItemStarted {
            index,
            total,
            path: path.clone(),
        });
        let success = publish_one(pipeline, publisher, &job, path, sink).await;
        if success {
            report.record_success();
        } else {
            report.record_failure();
        }
        sink.emit(PublishEvent::BatchItemFinished {
            index,
            total,
            path: path.clone(),
            success,
        });
    }

    ink_info!(
        "Batch finished: {} processed, {} succeeded, {} failed{}",
        report.processed,
        report.succeeded,
        report.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    report
}

async fn publish_one(
    pipeline: &Pipeline,
    publisher: &Publisher,
    job: &BatchJob<'_>,
    path: &Path,
    sink: &dyn ProgressSink,
) -> bool {
    let doc = match SourceDocument::load(path).await {
        Ok(doc) => doc,
        Err(err) => {
            ink_warn!("Skipping {}: {err}", path.display());
            sink.emit(PublishEvent::Notice(err.to_string()));
            return false;
        }
    };
    let article = pipeline.render(&doc).await;
    let account = job
        .accounts
        .select(job.requested_account, doc.meta.appid.as_deref());
    let request = PublishRequest {
        article: &article,
        account: account.as_ref(),
        cover: None,
    };
    match publisher.publish_draft(request, sink).await {
        Ok(_) => true,
        Err(failure) => {
            sink.emit(PublishEvent::Notice(format!("{}: {failure}", article.title)));
            false
        }
    }
}
