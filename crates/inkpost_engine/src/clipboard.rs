use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use inkpost_logging::{ink_debug, ink_info, ink_warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContent {
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    #[error("{target} clipboard write failed: {message}")]
    Write {
        target: &'static str,
        message: String,
    },
    #[error("could not copy the article to any clipboard ({attempts})")]
    Exhausted { attempts: String },
}

/// One way of putting content on the clipboard.
#[async_trait::async_trait]
pub trait ClipboardTarget: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_available(&self) -> bool;

    async fn write(&self, content: &ClipboardContent) -> Result<(), ClipboardError>;
}

/// Window focus of the host, which some clipboards require.
pub trait FocusHost: Send + Sync {
    fn has_focus(&self) -> bool;
    fn request_focus(&self);
}

/// Terminal hosts have no window to focus.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFocused;

impl FocusHost for AlwaysFocused {
    fn has_focus(&self) -> bool {
        true
    }

    fn request_focus(&self) {}
}

/// Desktop clipboard with an HTML flavour and a plain-text alternative.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeClipboard;

#[async_trait::async_trait]
impl ClipboardTarget for NativeClipboard {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn is_available(&self) -> bool {
        tokio::task::spawn_blocking(|| arboard::Clipboard::new().is_ok())
            .await
            .unwrap_or(false)
    }

    async fn write(&self, content: &ClipboardContent) -> Result<(), ClipboardError> {
        let html = content.html.clone();
        let text = content.text.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()?;
            clipboard.set_html(html, Some(text))
        })
        .await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ClipboardError::Write {
                target: self.name(),
                message: err.to_string(),
            }),
            Err(err) => Err(ClipboardError::Write {
                target: self.name(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Plain-text copy through the platform's copy utility.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    candidates: Vec<CopyCommand>,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        let candidates = if cfg!(target_os = "macos") {
            vec![CopyCommand {
                program: "pbcopy",
                args: &[],
            }]
        } else if cfg!(target_os = "windows") {
            vec![CopyCommand {
                program: "clip",
                args: &[],
            }]
        } else {
            vec![
                CopyCommand {
                    program: "wl-copy",
                    args: &[],
                },
                CopyCommand {
                    program: "xclip",
                    args: &["-selection", "clipboard"],
                },
                CopyCommand {
                    program: "xsel",
                    args: &["--clipboard", "--input"],
                },
            ]
        };
        Self { candidates }
    }
}

impl CommandClipboard {
    pub fn new(candidates: Vec<CopyCommand>) -> Self {
        Self { candidates }
    }

    fn first_installed(&self) -> Option<(CopyCommand, PathBuf)> {
        self.candidates
            .iter()
            .find_map(|candidate| find_program(candidate.program).map(|path| (*candidate, path)))
    }
}

fn find_program(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = dir.join(format!("{program}.exe"));
        exe.is_file().then_some(exe)
    })
}

#[async_trait::async_trait]
impl ClipboardTarget for CommandClipboard {
    fn name(&self) -> &'static str {
        "copy-command"
    }

    async fn is_available(&self) -> bool {
        self.first_installed().is_some()
    }

    async fn write(&self, content: &ClipboardContent) -> Result<(), ClipboardError> {
        let write_error = |message: String| ClipboardError::Write {
            target: "copy-command",
            message,
        };
        let (command, path) = self
            .first_installed()
            .ok_or_else(|| write_error("no copy command installed".to_string()))?;
        ink_debug!("Copying with {}", command.program);

        let mut child = Command::new(path)
            .args(command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| write_error(err.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.text.as_bytes())
                .await
                .map_err(|err| write_error(err.to_string()))?;
        }
        let status = child
            .wait()
            .await
            .map_err(|err| write_error(err.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(write_error(format!("{} exited with {status}", command.program)))
        }
    }
}

/// Tries each target in order until one accepts the content.
pub struct ClipboardChain {
    targets: Vec<Box<dyn ClipboardTarget>>,
    focus: Arc<dyn FocusHost>,
    focus_yield: Duration,
}

impl ClipboardChain {
    pub fn new(
        targets: Vec<Box<dyn ClipboardTarget>>,
        focus: Arc<dyn FocusHost>,
        focus_yield: Duration,
    ) -> Self {
        Self {
            targets,
            focus,
            focus_yield,
        }
    }

    /// Native clipboard first, then the platform copy command.
    pub fn system(focus: Arc<dyn FocusHost>, focus_yield: Duration) -> Self {
        Self::new(
            vec![
                Box::new(NativeClipboard),
                Box::new(CommandClipboard::default()),
            ],
            focus,
            focus_yield,
        )
    }

    /// Returns the name of the target that took the content.
    pub async fn copy(&self, content: &ClipboardContent) -> Result<&'static str, ClipboardError> {
        let mut attempts = Vec::new();
        for target in &self.targets {
            self.ensure_focus().await;
            if !target.is_available().await {
                attempts.push(format!("{}: unavailable", target.name()));
                continue;
            }
            match target.write(content).await {
                Ok(()) => {
                    ink_info!("Article copied via {} clipboard", target.name());
                    return Ok(target.name());
                }
                Err(err) => {
                    ink_warn!("{err}");
                    attempts.push(err.to_string());
                }
            }
        }
        Err(ClipboardError::Exhausted {
            attempts: if attempts.is_empty() {
                "no clipboard configured".to_string()
            } else {
                attempts.join("; ")
            },
        })
    }

    async fn ensure_focus(&self) {
        if !self.focus.has_focus() {
            self.focus.request_focus();
            tokio::time::sleep(self.focus_yield).await;
        }
    }
}
