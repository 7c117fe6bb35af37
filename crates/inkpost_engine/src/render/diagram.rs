use std::sync::{Arc, Mutex, PoisonError};

use inkpost_logging::{ink_debug, ink_warn};

use super::{fence_lang, Extension, RenderContext, RenderToken, SourceBlock, TokenKind};

const DIAGRAM_KIND: &str = "mermaid";
const SECTION_CLASS: &str = "note-mermaid";

/// Receives diagram sources for rasterization outside the pipeline.
pub trait DiagramHost: Send + Sync {
    fn register(&self, kind: &str, container_id: &str, source: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramJob {
    pub kind: String,
    pub container_id: String,
    pub source: String,
}

/// Host that queues registrations for whoever rasterizes them later.
#[derive(Debug, Default)]
pub struct DiagramQueue {
    jobs: Mutex<Vec<DiagramJob>>,
}

impl DiagramQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<DiagramJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl DiagramHost for DiagramQueue {
    fn register(&self, kind: &str, container_id: &str, source: &str) -> Result<(), String> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DiagramJob {
                kind: kind.to_string(),
                container_id: container_id.to_string(),
                source: source.to_string(),
            });
        Ok(())
    }
}

/// Reserves a `mermaid-{n}` placeholder per diagram and hands the source to the host.
pub struct DiagramExtension {
    host: Arc<dyn DiagramHost>,
}

impl DiagramExtension {
    pub fn new(host: Arc<dyn DiagramHost>) -> Self {
        Self { host }
    }
}

#[async_trait::async_trait]
impl Extension for DiagramExtension {
    fn name(&self) -> &'static str {
        "diagram"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        let SourceBlock::Fence { info, text } = block else {
            return None;
        };
        (fence_lang(info)?.as_str() == DIAGRAM_KIND)
            .then(|| RenderToken::new(TokenKind::Diagram, text.clone()))
    }

    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext) {
        let container_id = format!("{DIAGRAM_KIND}-{}", ctx.diagram_index());
        let html = match self.host.register(DIAGRAM_KIND, &container_id, token.raw()) {
            Ok(()) => {
                ctx.advance_diagram();
                ink_debug!("Registered diagram {container_id}");
                format!(r#"<section id="{container_id}" class="{SECTION_CLASS}"></section>"#)
            }
            Err(err) => {
                ink_warn!("Diagram {container_id} rejected by host: {err}");
                r#"<span class="note-mermaid-error">diagram render failed</span>"#.to_string()
            }
        };
        token.set_rendered(html);
    }
}
