use std::time::Duration;

use inkpost_core::looks_like_transport_failure;
use inkpost_logging::{ink_debug, redact};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::Account;

const API_PREFIX: &str = "api/v1/wechat/";
const MIN_API_KEY_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub server_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiSettings {
    /// Base URL with a trailing slash, so relative joins keep any path prefix.
    pub fn base_url(&self) -> Result<Url, ApiError> {
        let mut url = Url::parse(self.server_url.trim())
            .map_err(|err| ApiError::Config(format!("server url {}: {err}", self.server_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::Config(format!(
                "server url must be http or https, got {}",
                url.scheme()
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        self.base_url()?;
        if self.api_key.trim().len() < MIN_API_KEY_LEN {
            return Err(ApiError::Config(format!(
                "api key must be at least {MIN_API_KEY_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Failures of a backend call, split by what the caller should do about them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The backend could not be reached (refused, reset, timeout, CORS).
    #[error("backend unreachable: {0}")]
    Transport(String),
    /// The backend or platform answered and said no.
    #[error("{operation} rejected (code {code}): {message}")]
    Application {
        operation: &'static str,
        code: i64,
        message: String,
    },
    #[error("unexpected response from {operation}: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },
    #[error("invalid api settings: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub base64: String,
    pub filename: String,
    pub token: String,
    pub storage: StorageClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MediaResult {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DraftList {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub item: Vec<DraftItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DraftItem {
    pub media_id: String,
    #[serde(default)]
    pub content: Option<DraftContent>,
}

impl DraftItem {
    /// Title of the first article in the draft.
    pub fn title(&self) -> Option<&str> {
        self.content
            .as_ref()
            .and_then(|content| content.news_item.first())
            .map(|news| news.title.as_str())
            .filter(|title| !title.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DraftContent {
    #[serde(default)]
    pub news_item: Vec<NewsItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
}

/// Article payload for draft create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftArticle {
    pub title: String,
    pub content: String,
    pub author: String,
    pub digest: String,
    pub content_source_url: String,
    pub thumb_media_id: String,
    pub show_cover_pic: bool,
    pub need_open_comment: bool,
    pub only_fans_can_comment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_crop_235_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_crop_1_1: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DraftResult {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub media_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MaterialList {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub item: Vec<MaterialItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaterialItem {
    pub media_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Calls the platform through the backend proxy.
#[async_trait::async_trait]
pub trait WechatApi: Send + Sync {
    async fn get_token(&self, account: &Account) -> Result<AccessToken, ApiError>;

    async fn upload_media(&self, upload: &MediaUpload) -> Result<MediaResult, ApiError>;

    async fn draft_list(&self, token: &str, offset: u32, count: u32) -> Result<DraftList, ApiError>;

    async fn create_draft(
        &self,
        articles: &[DraftArticle],
        token: &str,
    ) -> Result<DraftResult, ApiError>;

    async fn update_draft(
        &self,
        media_id: &str,
        index: u32,
        article: &DraftArticle,
        token: &str,
    ) -> Result<DraftResult, ApiError>;

    async fn material_list(
        &self,
        kind: &str,
        offset: u32,
        count: u32,
        token: &str,
    ) -> Result<MaterialList, ApiError>;

    async fn health(&self) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReqwestApiClient {
    settings: ApiSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        settings.validate()?;
        let base = settings.base_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::Config(err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url, ApiError> {
        self.base
            .join(API_PREFIX)
            .and_then(|prefix| prefix.join(name))
            .map_err(|err| ApiError::Config(err.to_string()))
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(endpoint)?;
        Ok(self.authorized(method, url))
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("X-API-Key", &self.settings.api_key)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                return Err(ApiError::Protocol {
                    operation,
                    message: err.to_string(),
                });
            }
            Err(_) => {
                return Err(classify_failure(
                    operation,
                    i64::from(status.as_u16()),
                    status.to_string(),
                ));
            }
        };

        if !envelope.success {
            let message = envelope.error.unwrap_or_else(|| status.to_string());
            return Err(classify_failure(operation, i64::from(status.as_u16()), message));
        }
        envelope.data.ok_or_else(|| ApiError::Protocol {
            operation,
            message: "response carried no data".to_string(),
        })
    }
}

fn classify_failure(operation: &'static str, code: i64, message: String) -> ApiError {
    if looks_like_transport_failure(&message) {
        ApiError::Transport(message)
    } else {
        ApiError::Application {
            operation,
            code,
            message,
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        return ApiError::Config(err.to_string());
    }
    if err.is_timeout() {
        return ApiError::Transport(format!("timeout: {err}"));
    }
    ApiError::Transport(err.to_string())
}

fn reject_errcode(operation: &'static str, errcode: i64, errmsg: Option<String>) -> Result<(), ApiError> {
    if errcode == 0 {
        return Ok(());
    }
    Err(ApiError::Application {
        operation,
        code: errcode,
        message: errmsg.unwrap_or_else(|| "unknown error".to_string()),
    })
}

#[async_trait::async_trait]
impl WechatApi for ReqwestApiClient {
    async fn get_token(&self, account: &Account) -> Result<AccessToken, ApiError> {
        ink_debug!(
            "Requesting access token for {} (secret {})",
            account.app_id,
            redact(&account.app_secret)
        );
        let request = self.request(Method::POST, "access-token")?.json(&json!({
            "app_id": account.app_id,
            "app_secret": account.app_secret,
        }));
        let token: AccessToken = self.send("get token", request).await?;
        if token.access_token.is_empty() {
            return Err(ApiError::Protocol {
                operation: "get token",
                message: "empty access token".to_string(),
            });
        }
        Ok(token)
    }

    async fn upload_media(&self, upload: &MediaUpload) -> Result<MediaResult, ApiError> {
        ink_debug!(
            "Uploading {} ({} base64 chars, token {})",
            upload.filename,
            upload.base64.len(),
            redact(&upload.token)
        );
        let mut body = json!({
            "image_data": upload.base64,
            "filename": upload.filename,
            "access_token": upload.token,
        });
        if upload.storage == StorageClass::Permanent {
            body["type"] = json!("image");
        }
        let request = self.request(Method::POST, "upload-image")?.json(&body);
        self.send("upload media", request).await
    }

    async fn draft_list(&self, token: &str, offset: u32, count: u32) -> Result<DraftList, ApiError> {
        let mut url = self.endpoint("drafts")?;
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("offset", &offset.to_string())
            .append_pair("count", &count.to_string());
        let request = self.authorized(Method::GET, url);
        let list: DraftList = self.send("list drafts", request).await?;
        reject_errcode("list drafts", list.errcode, list.errmsg.clone())?;
        Ok(list)
    }

    async fn create_draft(
        &self,
        articles: &[DraftArticle],
        token: &str,
    ) -> Result<DraftResult, ApiError> {
        let request = self.request(Method::POST, "create-draft")?.json(&json!({
            "articles": articles,
            "access_token": token,
        }));
        self.send("create draft", request).await
    }

    async fn update_draft(
        &self,
        media_id: &str,
        index: u32,
        article: &DraftArticle,
        token: &str,
    ) -> Result<DraftResult, ApiError> {
        let request = self.request(Method::PUT, "update-draft")?.json(&json!({
            "media_id": media_id,
            "index": index,
            "article": article,
            "access_token": token,
        }));
        self.send("update draft", request).await
    }

    async fn material_list(
        &self,
        kind: &str,
        offset: u32,
        count: u32,
        token: &str,
    ) -> Result<MaterialList, ApiError> {
        let request = self.request(Method::POST, "batch-get-material")?.json(&json!({
            "type": kind,
            "offset": offset,
            "count": count,
            "access_token": token,
        }));
        let list: MaterialList = self.send("list material", request).await?;
        reject_errcode("list material", list.errcode, list.errmsg.clone())?;
        Ok(list)
    }

    async fn health(&self) -> Result<(), ApiError> {
        let response = self
            .request(Method::GET, "health")?
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(classify_failure("health", i64::from(status.as_u16()), status.to_string()))
        }
    }
}

/// Stands in for the client when the backend settings are invalid, so
/// offline commands still work and online ones fail with the reason.
#[derive(Debug, Clone)]
pub struct UnconfiguredApi {
    reason: String,
}

impl UnconfiguredApi {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, ApiError> {
        Err(ApiError::Config(self.reason.clone()))
    }
}

#[async_trait::async_trait]
impl WechatApi for UnconfiguredApi {
    async fn get_token(&self, _account: &Account) -> Result<AccessToken, ApiError> {
        self.fail()
    }

    async fn upload_media(&self, _upload: &MediaUpload) -> Result<MediaResult, ApiError> {
        self.fail()
    }

    async fn draft_list(&self, _token: &str, _offset: u32, _count: u32) -> Result<DraftList, ApiError> {
        self.fail()
    }

    async fn create_draft(
        &self,
        _articles: &[DraftArticle],
        _token: &str,
    ) -> Result<DraftResult, ApiError> {
        self.fail()
    }

    async fn update_draft(
        &self,
        _media_id: &str,
        _index: u32,
        _article: &DraftArticle,
        _token: &str,
    ) -> Result<DraftResult, ApiError> {
        self.fail()
    }

    async fn material_list(
        &self,
        _kind: &str,
        _offset: u32,
        _count: u32,
        _token: &str,
    ) -> Result<MaterialList, ApiError> {
        self.fail()
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.fail()
    }
}
