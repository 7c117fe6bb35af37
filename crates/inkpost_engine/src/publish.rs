use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use inkpost_core::{
    Admission, BackendState, DraftMode, FallbackReason, LocalAsset, PublishAttempt, PublishResult,
    PublishStage,
};
use inkpost_logging::{ink_error, ink_info, ink_warn};
use thiserror::Error;

use crate::api::{ApiError, DraftArticle, MediaUpload, StorageClass, WechatApi};
use crate::article::{fallback_media_url, finalize_content, plain_text};
use crate::assets::{scan_pending, AssetReader, AssetRegistry};
use crate::clipboard::{ClipboardChain, ClipboardContent, ClipboardError};
use crate::guard::BackendGuard;
use crate::render::{RenderServices, RenderedArticle};
use crate::{Account, Preservation, ProgressSink, PublishEvent};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub draft_page_size: u32,
    /// Draft pages scanned for a title match.
    pub draft_pages: u32,
    /// Pause before each batch item.
    pub batch_delay: Duration,
    pub digest_chars: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            draft_page_size: 20,
            draft_pages: 1,
            batch_delay: Duration::from_secs(5),
            digest_chars: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("no account selected")]
    NoAccount,
    #[error("backend unreachable: {0}")]
    BackendUnreachable(String),
    #[error("get token failed: {0}")]
    Token(String),
    #[error("cover unavailable: {0}")]
    Cover(String),
    #[error("{operation} failed: {message}")]
    Submit {
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Api(ApiError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error("publish state error: {0}")]
    State(String),
}

/// A failed draft publish, with where it stopped and what became of the content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} ({preservation})")]
pub struct PublishFailure {
    pub stage: PublishStage,
    pub error: PublishError,
    pub preservation: Preservation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutcome {
    pub title: String,
    pub mode: DraftMode,
    pub media_id: Option<String>,
    pub uploaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadTally {
    pub uploaded: usize,
    pub failed: usize,
}

pub struct PublishRequest<'a> {
    pub article: &'a RenderedArticle,
    pub account: Option<&'a Account>,
    /// Local cover file chosen by the user; wins over front matter.
    pub cover: Option<&'a Path>,
}

/// Runs copy and draft-publish attempts against the backend.
pub struct Publisher {
    api: Arc<dyn WechatApi>,
    guard: Arc<BackendGuard>,
    clipboard: Arc<ClipboardChain>,
    reader: Arc<dyn AssetReader>,
    services: RenderServices,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(
        api: Arc<dyn WechatApi>,
        guard: Arc<BackendGuard>,
        clipboard: Arc<ClipboardChain>,
        reader: Arc<dyn AssetReader>,
        services: RenderServices,
        settings: PublishSettings,
    ) -> Self {
        Self {
            api,
            guard,
            clipboard,
            reader,
            services,
            settings,
        }
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    pub fn guard(&self) -> &BackendGuard {
        &self.guard
    }

    /// Uploads local images then copies the finished article. Without an
    /// account, with the backend down or without a token the article is
    /// copied as-is and the result says why.
    pub async fn copy_article(
        &self,
        article: &RenderedArticle,
        account: Option<&Account>,
        sink: &dyn ProgressSink,
    ) -> Result<PublishResult, PublishError> {
        let Some(account) = account else {
            self.copy_only(article, sink).await?;
            return Ok(PublishResult::fallback(FallbackReason::NoAccount));
        };

        let token = match self.acquire_token(account, sink).await {
            Ok(token) => token,
            Err(err) => {
                let reason = match err {
                    PublishError::BackendUnreachable(_) => FallbackReason::BackendDown,
                    _ => FallbackReason::TokenFailed,
                };
                ink_warn!("Copying without uploads: {err}");
                self.copy_only(article, sink).await?;
                return Ok(PublishResult::fallback(reason));
            }
        };

        let tally = self.upload_assets(article, &token, sink).await;
        self.copy_only(article, sink).await?;

        if tally.uploaded == 0
            && tally.failed > 0
            && self.guard.state() == BackendState::Unavailable
        {
            return Ok(PublishResult::fallback(FallbackReason::BackendDown));
        }
        Ok(PublishResult::uploaded())
    }

    /// Copies the article in its current state. Never touches the network.
    pub async fn copy_only(
        &self,
        article: &RenderedArticle,
        sink: &dyn ProgressSink,
    ) -> Result<&'static str, ClipboardError> {
        let html = self.final_content(article);
        let content = ClipboardContent {
            text: plain_text(&html),
            html,
        };
        let target = self.clipboard.copy(&content).await?;
        sink.emit(PublishEvent::Copied { target });
        Ok(target)
    }

    /// Runs one publish attempt through every stage. Failures past the idle
    /// stage fall back to copying the article.
    pub async fn publish_draft(
        &self,
        request: PublishRequest<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<DraftOutcome, PublishFailure> {
        let mut attempt = PublishAttempt::new();
        let result = match request.account {
            Some(account) => self.run_attempt(&mut attempt, &request, account, sink).await,
            None => Err(PublishError::NoAccount),
        };

        let error = match result {
            Ok(outcome) => return Ok(outcome),
            Err(error) => error,
        };

        let stage = attempt.fail();
        sink.emit(PublishEvent::Stage(PublishStage::Failed));
        ink_error!("Publishing {:?} failed at {}: {error}", request.article.title, stage.label());

        let preservation = if stage == PublishStage::Idle {
            Preservation::NotAttempted
        } else {
            match self.copy_only(request.article, sink).await {
                Ok(_) => Preservation::Clipboard,
                Err(err) => {
                    ink_error!("Clipboard fallback failed: {err}");
                    Preservation::Lost
                }
            }
        };
        Err(PublishFailure {
            stage,
            error,
            preservation,
        })
    }

    async fn run_attempt(
        &self,
        attempt: &mut PublishAttempt,
        request: &PublishRequest<'_>,
        account: &Account,
        sink: &dyn ProgressSink,
    ) -> Result<DraftOutcome, PublishError> {
        let article = request.article;

        enter(attempt, PublishStage::AcquiringToken, sink)?;
        let token = self.acquire_token(account, sink).await?;

        enter(attempt, PublishStage::CheckingDraftExistence, sink)?;
        let mode = self.find_draft(&token, &article.title, sink).await?;
        attempt.set_mode(mode.clone());

        enter(attempt, PublishStage::UploadingAssets, sink)?;
        let tally = self.upload_assets(article, &token, sink).await;

        enter(attempt, PublishStage::ResolvingCover, sink)?;
        let cover = self
            .resolve_cover(article, request.cover, &token, sink)
            .await?;

        enter(attempt, PublishStage::BuildingPayload, sink)?;
        let payload = self.build_payload(article, cover);

        enter(attempt, PublishStage::SubmittingDraft, sink)?;
        let media_id = self.submit(&mode, payload, &token, sink).await?;

        enter(attempt, PublishStage::Done, sink)?;
        ink_info!(
            "Draft {:?} {} ({} images uploaded, {} skipped)",
            article.title,
            match mode {
                DraftMode::Create => "created",
                DraftMode::Update { .. } => "updated",
            },
            tally.uploaded,
            tally.failed
        );
        sink.emit(PublishEvent::DraftSubmitted {
            mode: mode.clone(),
            title: article.title.clone(),
        });
        Ok(DraftOutcome {
            title: article.title.clone(),
            mode,
            media_id,
            uploaded: tally.uploaded,
            failed: tally.failed,
        })
    }

    fn admit(&self, sink: &dyn ProgressSink) -> Result<(), PublishError> {
        match self.guard.admit() {
            Admission::Proceed => Ok(()),
            Admission::ShortCircuit { remaining } => Err(self.unreachable(
                format!("cooling down for {}ms", remaining.as_millis()),
                sink,
            )),
        }
    }

    fn unreachable(&self, detail: String, sink: &dyn ProgressSink) -> PublishError {
        if self.guard.should_notify() {
            sink.emit(PublishEvent::Notice(
                "Backend service is unreachable, check that it is running".to_string(),
            ));
        }
        PublishError::BackendUnreachable(detail)
    }

    fn api_failure(&self, err: ApiError, sink: &dyn ProgressSink) -> PublishError {
        match err {
            ApiError::Transport(message) => self.unreachable(message, sink),
            other => PublishError::Api(other),
        }
    }

    async fn acquire_token(
        &self,
        account: &Account,
        sink: &dyn ProgressSink,
    ) -> Result<String, PublishError> {
        self.admit(sink)?;
        let result = self.api.get_token(account).await;
        self.guard.observe(&result);
        match result {
            Ok(token) => Ok(token.access_token),
            Err(err) if err.is_transport() => Err(self.api_failure(err, sink)),
            Err(ApiError::Application { message, .. }) => Err(PublishError::Token(message)),
            Err(err) => Err(PublishError::Token(err.to_string())),
        }
    }

    /// Exact title match against recent drafts. A lookup the platform
    /// rejects falls back to creating a new draft.
    async fn find_draft(
        &self,
        token: &str,
        title: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DraftMode, PublishError> {
        let page_size = self.settings.draft_page_size.max(1);
        let mut offset = 0;
        for _ in 0..self.settings.draft_pages.max(1) {
            self.admit(sink)?;
            let result = self.api.draft_list(token, offset, page_size).await;
            self.guard.observe(&result);
            let page = match result {
                Ok(page) => page,
                Err(err) if err.is_transport() => return Err(self.api_failure(err, sink)),
                Err(err) => {
                    ink_warn!("Draft lookup failed, creating a new draft: {err}");
                    return Ok(DraftMode::Create);
                }
            };
            if let Some(item) = page.item.iter().find(|item| item.title() == Some(title)) {
                ink_info!("Found existing draft {} for {title:?}", item.media_id);
                return Ok(DraftMode::Update {
                    media_id: item.media_id.clone(),
                    index: 0,
                });
            }
            offset += page.item.len() as u32;
            if page.item.is_empty() || offset >= page.total_count {
                break;
            }
        }
        Ok(DraftMode::Create)
    }

    /// Uploads pending assets one at a time. Failures are skipped.
    pub async fn upload_assets(
        &self,
        article: &RenderedArticle,
        token: &str,
        sink: &dyn ProgressSink,
    ) -> UploadTally {
        let assets = &self.services.assets;
        let scan = scan_pending(assets, self.reader.as_ref(), &article.title, &article.markdown).await;
        let mut tally = UploadTally::default();

        for unreadable in scan.unreadable {
            record_failure(assets, &unreadable.path, true);
            sink.emit(PublishEvent::UploadSkipped {
                filename: unreadable.path.display().to_string(),
                reason: unreadable.message,
            });
            tally.failed += 1;
        }

        let total = scan.uploads.len();
        for (index, upload) in scan.uploads.into_iter().enumerate() {
            sink.emit(PublishEvent::UploadProgress {
                index: index + 1,
                total,
                filename: upload.filename.clone(),
            });
            if let Err(err) = assets.update(&upload.path, LocalAsset::begin_upload) {
                ink_warn!("Skipping {:?}: {err}", upload.path);
                continue;
            }

            let outcome = match self.admit(sink) {
                Err(err) => Err(err.to_string()),
                Ok(()) => {
                    let request = MediaUpload {
                        base64: upload.base64,
                        filename: upload.filename.clone(),
                        token: token.to_string(),
                        storage: StorageClass::Permanent,
                    };
                    let result = self.api.upload_media(&request).await;
                    self.guard.observe(&result);
                    match result {
                        Ok(media) if media.errcode == 0 => match media.media_id {
                            Some(media_id) => {
                                let url = media
                                    .url
                                    .filter(|url| !url.is_empty())
                                    .unwrap_or_else(|| fallback_media_url(&media_id));
                                Ok((media_id, url))
                            }
                            None => Err("upload returned no media id".to_string()),
                        },
                        Ok(media) => Err(media
                            .errmsg
                            .unwrap_or_else(|| format!("errcode {}", media.errcode))),
                        Err(err) => Err(self.api_failure(err, sink).to_string()),
                    }
                }
            };

            match outcome {
                Ok((media_id, url)) => {
                    if let Err(err) =
                        assets.update(&upload.path, |asset| asset.mark_uploaded(media_id, url))
                    {
                        ink_warn!("{err}");
                    }
                    tally.uploaded += 1;
                }
                Err(reason) => {
                    ink_warn!("Upload of {} failed: {reason}", upload.filename);
                    record_failure(assets, &upload.path, false);
                    sink.emit(PublishEvent::UploadSkipped {
                        filename: upload.filename,
                        reason,
                    });
                    tally.failed += 1;
                }
            }
        }
        tally
    }

    /// Explicit file, then front matter `cover`, then front matter
    /// `thumb_media_id`, then the newest image in the material library.
    async fn resolve_cover(
        &self,
        article: &RenderedArticle,
        explicit: Option<&Path>,
        token: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String, PublishError> {
        let local: Option<PathBuf> = match (explicit, article.meta.cover.as_deref()) {
            (Some(path), _) => Some(path.to_path_buf()),
            (None, Some(link)) => Some(
                self.services
                    .resolver
                    .resolve(link, &article.base_dir())
                    .ok_or_else(|| PublishError::Cover(format!("cover file not found: {link}")))?,
            ),
            (None, None) => None,
        };
        if let Some(path) = local {
            return self.upload_cover(&path, token, sink).await;
        }

        if let Some(media_id) = article.meta.thumb_media_id.as_deref() {
            return Ok(media_id.to_string());
        }

        self.admit(sink)?;
        let result = self.api.material_list("image", 0, 1, token).await;
        self.guard.observe(&result);
        match result {
            Ok(list) => list
                .item
                .into_iter()
                .next()
                .map(|item| item.media_id)
                .ok_or_else(|| {
                    PublishError::Cover(
                        "choose a cover image or add one to the material library".to_string(),
                    )
                }),
            Err(err) if err.is_transport() => Err(self.api_failure(err, sink)),
            Err(err) => Err(PublishError::Cover(err.to_string())),
        }
    }

    async fn upload_cover(
        &self,
        path: &Path,
        token: &str,
        sink: &dyn ProgressSink,
    ) -> Result<String, PublishError> {
        let bytes = self
            .reader
            .read(path)
            .await
            .map_err(|err| PublishError::Cover(format!("cannot read {}: {err}", path.display())))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cover.png".to_string());

        self.admit(sink)?;
        let result = self
            .api
            .upload_media(&MediaUpload {
                base64: STANDARD.encode(bytes),
                filename,
                token: token.to_string(),
                storage: StorageClass::Permanent,
            })
            .await;
        self.guard.observe(&result);
        match result {
            Ok(media) => match media.media_id {
                Some(media_id) if media.errcode == 0 => Ok(media_id),
                _ => Err(PublishError::Cover(format!(
                    "cover upload failed: {}",
                    media.errmsg.unwrap_or_else(|| "unknown error".to_string())
                ))),
            },
            Err(err) if err.is_transport() => Err(self.api_failure(err, sink)),
            Err(err) => Err(PublishError::Cover(err.to_string())),
        }
    }

    fn final_content(&self, article: &RenderedArticle) -> String {
        finalize_content(&article.html, &self.services.assets, &self.services.cards)
    }

    /// Maps the article and its front matter onto the draft payload.
    pub fn build_payload(&self, article: &RenderedArticle, thumb_media_id: String) -> DraftArticle {
        let meta = &article.meta;
        let digest = meta
            .digest
            .clone()
            .unwrap_or_else(|| article.title.chars().take(self.settings.digest_chars).collect());
        let crop = meta.crop_values();
        DraftArticle {
            title: article.title.clone(),
            content: self.final_content(article),
            author: meta.author.clone().unwrap_or_default(),
            digest,
            content_source_url: meta.content_source_url.clone().unwrap_or_default(),
            thumb_media_id,
            show_cover_pic: true,
            need_open_comment: meta.need_open_comment,
            only_fans_can_comment: meta.only_fans_can_comment,
            pic_crop_235_1: crop.map(|(wide, _)| wide.to_string()),
            pic_crop_1_1: crop.map(|(_, square)| square.to_string()),
        }
    }

    async fn submit(
        &self,
        mode: &DraftMode,
        payload: DraftArticle,
        token: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Option<String>, PublishError> {
        self.admit(sink)?;
        let (operation, result, known_id) = match mode {
            DraftMode::Create => (
                "create draft",
                self.api.create_draft(std::slice::from_ref(&payload), token).await,
                None,
            ),
            DraftMode::Update { media_id, index } => (
                "update draft",
                self.api.update_draft(media_id, *index, &payload, token).await,
                Some(media_id.clone()),
            ),
        };
        self.guard.observe(&result);
        match result {
            Ok(response) if response.errcode == 0 => Ok(response.media_id.or(known_id)),
            Ok(response) => Err(PublishError::Submit {
                operation,
                message: response
                    .errmsg
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            Err(ApiError::Application { message, .. }) => {
                Err(PublishError::Submit { operation, message })
            }
            Err(err) => Err(self.api_failure(err, sink)),
        }
    }
}

fn enter(
    attempt: &mut PublishAttempt,
    stage: PublishStage,
    sink: &dyn ProgressSink,
) -> Result<(), PublishError> {
    attempt
        .advance(stage)
        .map_err(|err| PublishError::State(err.to_string()))?;
    sink.emit(PublishEvent::Stage(stage));
    Ok(())
}

/// Moves an asset to `Failed`, first through `Uploading` when it never
/// started. A rejected transition is logged and reported as `false`.
fn record_failure(assets: &AssetRegistry, path: &Path, from_pending: bool) -> bool {
    let result = assets.update(path, |asset| {
        if from_pending {
            asset.begin_upload()?;
        }
        asset.mark_failed()
    });
    match result {
        Ok(()) => true,
        Err(err) => {
            ink_warn!("Cannot record failed upload: {err}");
            false
        }
    }
}
