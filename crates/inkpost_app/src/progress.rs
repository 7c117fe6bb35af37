use inkpost_core::DraftMode;
use inkpost_engine::{ProgressSink, PublishEvent};
use inkpost_logging::{ink_debug, ink_info, ink_warn};

/// Reports publish progress on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalSink;

impl ProgressSink for TerminalSink {
    fn emit(&self, event: PublishEvent) {
        match event {
            PublishEvent::Stage(stage) => ink_debug!("Stage: {}", stage.label()),
            PublishEvent::UploadProgress {
                index,
                total,
                filename,
            } => eprintln!("Uploading image {index}/{total}: {filename}"),
            PublishEvent::UploadSkipped { filename, reason } => {
                ink_warn!("Skipped {filename}: {reason}");
            }
            PublishEvent::Notice(message) => eprintln!("{message}"),
            PublishEvent::Copied { target } => ink_info!("Copied to clipboard via {target}"),
            PublishEvent::DraftSubmitted { mode, title } => match mode {
                DraftMode::Create => eprintln!("Created draft {title:?}"),
                DraftMode::Update { media_id, .. } => {
                    eprintln!("Updated draft {title:?} ({media_id})")
                }
            },
            PublishEvent::BatchItemStarted { index, total, path } => {
                eprintln!("[{index}/{total}] {}", path.display());
            }
            PublishEvent::BatchItemFinished {
                index,
                total,
                success,
                ..
            } => ink_info!(
                "[{index}/{total}] {}",
                if success { "done" } else { "failed" }
            ),
        }
    }
}
