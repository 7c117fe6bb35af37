use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use inkpost_core::BreakerPolicy;
use inkpost_logging::ink_warn;

use crate::api::{ApiSettings, ReqwestApiClient, UnconfiguredApi, WechatApi};
use crate::assets::{AssetReader, FsAssetReader, VaultResolver};
use crate::clipboard::{AlwaysFocused, ClipboardChain};
use crate::guard::{BackendGuard, Clock, SystemClock};
use crate::publish::{PublishSettings, Publisher};
use crate::render::{DiagramQueue, Pipeline, RenderOptions, RenderServices, RenderedArticle};
use crate::source::{DecodeError, SourceDocument};

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub api: ApiSettings,
    pub render: RenderOptions,
    pub publish: PublishSettings,
    pub breaker: BreakerPolicy,
    /// Pause after asking the host for focus before a clipboard write.
    pub focus_yield: Duration,
    /// Fallback directory for resolving image links by name.
    pub vault_root: Option<PathBuf>,
}

/// Collaborators the engine talks to; swapped for fakes in tests.
pub struct EngineParts {
    pub api: Arc<dyn WechatApi>,
    pub clipboard: ClipboardChain,
    pub reader: Arc<dyn AssetReader>,
    pub clock: Arc<dyn Clock>,
}

/// Long-lived registries, the render pipeline and the publisher, built once
/// per process and shared by every command.
pub struct Engine {
    pipeline: Pipeline,
    publisher: Publisher,
    diagrams: Arc<DiagramQueue>,
    api: Arc<dyn WechatApi>,
    reader: Arc<dyn AssetReader>,
}

impl Engine {
    /// Engine backed by the HTTP client, the system clipboard and the file
    /// system. Invalid backend settings only fail the calls that need them.
    pub fn new(settings: EngineSettings) -> Self {
        let api: Arc<dyn WechatApi> = match ReqwestApiClient::new(settings.api.clone()) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                ink_warn!("Backend client disabled: {err}");
                Arc::new(UnconfiguredApi::new(err.to_string()))
            }
        };
        let parts = EngineParts {
            api,
            clipboard: ClipboardChain::system(Arc::new(AlwaysFocused), settings.focus_yield),
            reader: Arc::new(FsAssetReader),
            clock: Arc::new(SystemClock),
        };
        Self::with_parts(settings, parts)
    }

    pub fn with_parts(settings: EngineSettings, parts: EngineParts) -> Self {
        let diagrams = Arc::new(DiagramQueue::new());
        let resolver = Arc::new(VaultResolver::new(settings.vault_root.clone()));
        let services = RenderServices::new(diagrams.clone(), resolver);
        let pipeline = Pipeline::new(services.clone(), settings.render.clone());
        let guard = Arc::new(BackendGuard::new(settings.breaker, parts.clock));
        let publisher = Publisher::new(
            parts.api.clone(),
            guard,
            Arc::new(parts.clipboard),
            parts.reader.clone(),
            services,
            settings.publish,
        );
        Self {
            pipeline,
            publisher,
            diagrams,
            api: parts.api,
            reader: parts.reader,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn services(&self) -> &RenderServices {
        self.pipeline.services()
    }

    /// Diagrams registered by renders so far, for the rasterizer to pick up.
    pub fn diagrams(&self) -> &DiagramQueue {
        &self.diagrams
    }

    pub fn api(&self) -> &dyn WechatApi {
        self.api.as_ref()
    }

    pub fn reader(&self) -> &dyn AssetReader {
        self.reader.as_ref()
    }

    pub async fn render_file(&self, path: &Path) -> Result<RenderedArticle, DecodeError> {
        let doc = SourceDocument::load(path).await?;
        Ok(self.pipeline.render(&doc).await)
    }
}
