mod config;
mod logging;
mod progress;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inkpost_core::FallbackReason;
use inkpost_engine::{
    batch_publish, export_html, finalize_content, list_markdown_files, AtomicFileWriter, BatchJob,
    CancellationSignal, Engine, PublishRequest, RenderedArticle,
};
use inkpost_logging::{ink_info, ink_warn};

use crate::config::{load_config, AppConfig};
use crate::logging::LogDestination;
use crate::progress::TerminalSink;

#[derive(Parser, Debug)]
#[command(name = "inkpost")]
#[command(about = "Render markdown notes as WeChat articles and publish them as drafts")]
struct Cli {
    /// Config file (defaults to ./inkpost.ron)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to FILE (default ./inkpost.log)
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = logging::DEFAULT_LOG_FILE
    )]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print or write the article HTML
    Render {
        file: PathBuf,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Upload local images and copy the article to the clipboard
    Copy {
        file: PathBuf,
        #[arg(long)]
        account: Option<String>,
    },
    /// Create or update the draft for a note
    Publish {
        file: PathBuf,
        #[arg(long)]
        account: Option<String>,
        #[arg(long, value_name = "FILE")]
        cover: Option<PathBuf>,
    },
    /// Publish every note in a directory; Ctrl-C stops after the current one
    Batch {
        dir: PathBuf,
        #[arg(long)]
        account: Option<String>,
    },
    /// Write a standalone HTML page with images embedded
    Export {
        file: PathBuf,
        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },
    /// Check that the backend answers
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let destination = match cli.log_file.clone() {
        Some(path) => LogDestination::TerminalAndFile(path),
        None => LogDestination::Terminal,
    };
    logging::initialize(destination, logging::level_for(cli.verbose));

    let config = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: AppConfig) -> Result<()> {
    let engine = Engine::new(config.engine_settings()?);
    let book = config.account_book();
    let sink = TerminalSink;

    match command {
        Command::Render { file, out } => {
            let article = render(&engine, &file).await?;
            let services = engine.services();
            let html = finalize_content(&article.html, &services.assets, &services.cards);
            match out {
                Some(out) => {
                    let written = write_file(&out, &html)?;
                    println!("{}", written.display());
                }
                None => println!("{html}"),
            }
        }
        Command::Copy { file, account } => {
            let article = render(&engine, &file).await?;
            let account = book.select(account.as_deref(), article.meta.appid.as_deref());
            let result = engine
                .publisher()
                .copy_article(&article, account.as_ref(), &sink)
                .await?;
            let note = match result.reason {
                FallbackReason::None => "images uploaded",
                FallbackReason::NoAccount => "no account selected, images not uploaded",
                FallbackReason::BackendDown => "backend unreachable, images not uploaded",
                FallbackReason::TokenFailed => "token request failed, images not uploaded",
            };
            println!("Copied ({note})");
        }
        Command::Publish {
            file,
            account,
            cover,
        } => {
            config.validate()?;
            let article = render(&engine, &file).await?;
            let account = book.select(account.as_deref(), article.meta.appid.as_deref());
            let outcome = engine
                .publisher()
                .publish_draft(
                    PublishRequest {
                        article: &article,
                        account: account.as_ref(),
                        cover: cover.as_deref(),
                    },
                    &sink,
                )
                .await?;
            if outcome.failed > 0 {
                ink_warn!("{} image(s) were not uploaded", outcome.failed);
            }
            println!("{}", outcome.media_id.unwrap_or_default());
        }
        Command::Batch { dir, account } => {
            config.validate()?;
            let files = list_markdown_files(&dir)
                .await
                .with_context(|| format!("cannot list {}", dir.display()))?;
            if files.is_empty() {
                bail!("no markdown files in {}", dir.display());
            }

            let signal = CancellationSignal::new();
            let on_interrupt = signal.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Stopping after the current note...");
                    on_interrupt.cancel();
                }
            });

            let report = batch_publish(
                engine.pipeline(),
                engine.publisher(),
                BatchJob {
                    files: &files,
                    accounts: &book,
                    requested_account: account.as_deref(),
                    delay: engine.publisher().settings().batch_delay,
                },
                &signal,
                &sink,
            )
            .await;
            println!(
                "{} of {} processed: {} succeeded, {} failed{}",
                report.processed,
                report.total,
                report.succeeded,
                report.failed,
                if report.cancelled { " (cancelled)" } else { "" }
            );
            if report.failed > 0 {
                bail!("{} note(s) failed to publish", report.failed);
            }
        }
        Command::Export { file, out_dir } => {
            let article = render(&engine, &file).await?;
            let written =
                export_html(&article, engine.services(), engine.reader(), &out_dir).await?;
            println!("{}", written.display());
        }
        Command::Health => {
            config.validate()?;
            engine.api().health().await.context("backend health check failed")?;
            println!("Backend at {} is up", config.backend.server_url);
        }
    }
    Ok(())
}

async fn render(engine: &Engine, file: &Path) -> Result<RenderedArticle> {
    let article = engine
        .render_file(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let diagrams = engine.diagrams().drain();
    if !diagrams.is_empty() {
        ink_info!(
            "{} diagram(s) left as placeholders for the rasterizer",
            diagrams.len()
        );
    }
    Ok(article)
}

fn write_file(out: &Path, content: &str) -> Result<PathBuf> {
    let dir = out
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = out
        .file_name()
        .with_context(|| format!("{} is not a file path", out.display()))?;
    let written =
        AtomicFileWriter::new(dir.to_path_buf()).write(&name.to_string_lossy(), content)?;
    Ok(written)
}
