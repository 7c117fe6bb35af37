#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use inkpost_engine::{
    AccessToken, Account, AlwaysFocused, ApiError, ClipboardChain, ClipboardContent,
    ClipboardError, ClipboardTarget, Clock, DraftArticle, DraftContent, DraftItem, DraftList,
    DraftResult, Engine, EngineParts, EngineSettings, FsAssetReader, MaterialItem, MaterialList,
    MediaResult, MediaUpload, NewsItem, ProgressSink, PublishEvent, WechatApi,
};
use inkpost_engine::{DraftOutcome, PublishFailure, PublishRequest, RenderedArticle};

/// Scripted backend that records every call it receives.
#[derive(Default)]
pub struct FakeApi {
    pub down: AtomicBool,
    pub token_error: Mutex<Option<ApiError>>,
    /// `(media_id, title)` pairs returned by the draft list.
    pub drafts: Mutex<Vec<(String, String)>>,
    pub materials: Mutex<Vec<String>>,
    /// Uploads whose filename contains one of these fragments are rejected.
    pub reject_uploads: Mutex<Vec<String>>,
    /// Uploads fail as if the connection dropped; other calls still work.
    pub drop_uploads: AtomicBool,
    pub submit_error: Mutex<Option<(i64, String)>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub uploads: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<DraftArticle>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let api = Self::default();
        api.materials.lock().unwrap().push("library-cover".into());
        Arc::new(api)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.down.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn submit_result(&self, media_id: &str) -> DraftResult {
        match self.submit_error.lock().unwrap().clone() {
            Some((errcode, errmsg)) => DraftResult {
                errcode,
                errmsg: Some(errmsg),
                media_id: None,
            },
            None => DraftResult {
                errcode: 0,
                errmsg: None,
                media_id: Some(media_id.to_string()),
            },
        }
    }
}

#[async_trait::async_trait]
impl WechatApi for FakeApi {
    async fn get_token(&self, _account: &Account) -> Result<AccessToken, ApiError> {
        self.record("token")?;
        if let Some(err) = self.token_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(AccessToken {
            access_token: "tok".into(),
            expires_in: 7200,
        })
    }

    async fn upload_media(&self, upload: &MediaUpload) -> Result<MediaResult, ApiError> {
        self.record("upload")?;
        if self.drop_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".into()));
        }
        self.uploads.lock().unwrap().push(upload.filename.clone());
        let rejected = self
            .reject_uploads
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| upload.filename.contains(fragment.as_str()));
        if rejected {
            return Ok(MediaResult {
                errcode: 40005,
                errmsg: Some("invalid file type".into()),
                media_id: None,
                url: None,
            });
        }
        let count = self.uploads.lock().unwrap().len();
        Ok(MediaResult {
            errcode: 0,
            errmsg: None,
            media_id: Some(format!("media-{count}")),
            url: Some(format!("https://cdn.example/{}", upload.filename)),
        })
    }

    async fn draft_list(&self, _token: &str, _offset: u32, count: u32) -> Result<DraftList, ApiError> {
        self.record("drafts")?;
        let drafts = self.drafts.lock().unwrap();
        let item: Vec<DraftItem> = drafts
            .iter()
            .take(count as usize)
            .map(|(media_id, title)| DraftItem {
                media_id: media_id.clone(),
                content: Some(DraftContent {
                    news_item: vec![NewsItem {
                        title: title.clone(),
                    }],
                }),
            })
            .collect();
        Ok(DraftList {
            errcode: 0,
            errmsg: None,
            total_count: drafts.len() as u32,
            item,
        })
    }

    async fn create_draft(
        &self,
        articles: &[DraftArticle],
        _token: &str,
    ) -> Result<DraftResult, ApiError> {
        self.record("create")?;
        self.submitted.lock().unwrap().extend_from_slice(articles);
        Ok(self.submit_result("new-draft"))
    }

    async fn update_draft(
        &self,
        media_id: &str,
        _index: u32,
        article: &DraftArticle,
        _token: &str,
    ) -> Result<DraftResult, ApiError> {
        self.record("update")?;
        self.submitted.lock().unwrap().push(article.clone());
        Ok(self.submit_result(media_id))
    }

    async fn material_list(
        &self,
        _kind: &str,
        _offset: u32,
        count: u32,
        _token: &str,
    ) -> Result<MaterialList, ApiError> {
        self.record("material")?;
        let materials = self.materials.lock().unwrap();
        Ok(MaterialList {
            errcode: 0,
            errmsg: None,
            total_count: materials.len() as u32,
            item: materials
                .iter()
                .take(count as usize)
                .map(|media_id| MaterialItem {
                    media_id: media_id.clone(),
                    name: None,
                    url: None,
                })
                .collect(),
        })
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.record("health")
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}

/// Clipboard that keeps whatever it is given.
#[derive(Clone, Default)]
pub struct RecordingClipboard {
    pub copies: Arc<Mutex<Vec<ClipboardContent>>>,
}

#[async_trait::async_trait]
impl ClipboardTarget for RecordingClipboard {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn write(&self, content: &ClipboardContent) -> Result<(), ClipboardError> {
        self.copies.lock().unwrap().push(content.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PublishEvent>>,
}

impl RecordingSink {
    pub fn notices(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, PublishEvent::Notice(_)))
            .count()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: PublishEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Harness {
    pub engine: Engine,
    pub api: Arc<FakeApi>,
    pub clock: Arc<ManualClock>,
    pub clipboard: RecordingClipboard,
}

pub fn harness(settings: EngineSettings) -> Harness {
    let api = FakeApi::new();
    let clock = ManualClock::new();
    let clipboard = RecordingClipboard::default();
    let engine = Engine::with_parts(
        settings,
        EngineParts {
            api: api.clone(),
            clipboard: ClipboardChain::new(
                vec![Box::new(clipboard.clone())],
                Arc::new(AlwaysFocused),
                Duration::ZERO,
            ),
            reader: Arc::new(FsAssetReader),
            clock: clock.clone(),
        },
    );
    Harness {
        engine,
        api,
        clock,
        clipboard,
    }
}

pub fn account() -> Account {
    Account {
        name: "main".into(),
        app_id: "wx123".into(),
        app_secret: "secret".into(),
    }
}

/// Writes a note plus the named images into `dir`.
pub fn write_note(dir: &Path, name: &str, text: &str, images: &[&str]) -> PathBuf {
    for image in images {
        std::fs::write(dir.join(image), b"\x89PNG").unwrap();
    }
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Publishes `article` with the default test account.
pub async fn publish(
    h: &Harness,
    article: &RenderedArticle,
    sink: &RecordingSink,
) -> Result<DraftOutcome, PublishFailure> {
    let account = account();
    h.engine
        .publisher()
        .publish_draft(
            PublishRequest {
                article,
                account: Some(&account),
                cover: None,
            },
            sink,
        )
        .await
}
