use std::path::Path;
use std::sync::Arc;

use super::{error_span, escape_html, Extension, RenderContext, RenderToken, SourceBlock, TokenKind};
use crate::assets::{is_image_path, AssetRegistry, PathResolver};

/// Claims images that point at local files and registers them for upload.
pub struct LocalImageExtension {
    registry: Arc<AssetRegistry>,
    resolver: Arc<dyn PathResolver>,
}

impl LocalImageExtension {
    pub fn new(registry: Arc<AssetRegistry>, resolver: Arc<dyn PathResolver>) -> Self {
        Self { registry, resolver }
    }
}

fn is_remote(dest: &str) -> bool {
    let lowered = dest.trim().to_ascii_lowercase();
    ["http://", "https://", "data:", "//"]
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

/// `300` or `300x200` from an embed's `|` suffix.
fn parse_size(text: &str) -> Option<(u32, Option<u32>)> {
    let text = text.trim();
    match text.split_once('x') {
        Some((w, h)) => Some((w.trim().parse().ok()?, Some(h.trim().parse().ok()?))),
        None => Some((text.parse().ok()?, None)),
    }
}

#[async_trait::async_trait]
impl Extension for LocalImageExtension {
    fn name(&self) -> &'static str {
        "local-image"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        let SourceBlock::Image {
            dest,
            alt,
            title,
            embed,
        } = block
        else {
            return None;
        };
        if dest.is_empty() || is_remote(dest) {
            return None;
        }
        if *embed && !is_image_path(dest) {
            return None;
        }
        Some(RenderToken::new(
            TokenKind::LocalImage {
                alt: alt.clone(),
                title: title.clone(),
                embed: *embed,
            },
            dest.clone(),
        ))
    }

    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext) {
        let (alt, title, embed) = match token.kind() {
            TokenKind::LocalImage { alt, title, embed } => (alt.clone(), title.clone(), *embed),
            _ => return,
        };
        let link = token.raw().to_string();
        let Some(path) = self.resolver.resolve(&link, &ctx.base_dir) else {
            token.set_rendered(error_span(&format!("image not found: {link}")));
            return;
        };
        let res_url = self.registry.register(path, &link);

        // embeds carry either a size or a display name after the pipe
        let size = if embed { parse_size(&alt) } else { None };
        let alt = if size.is_some() || (embed && alt == link) {
            Path::new(&link)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            alt
        };

        token.set_rendered(image_markup(
            &res_url,
            &alt,
            &title,
            size,
            ctx.options.figcaption,
        ));
    }
}

/// `<img>` for an already-safe `src`, optionally inside a captioned figure.
pub(crate) fn image_markup(
    src: &str,
    alt: &str,
    title: &str,
    size: Option<(u32, Option<u32>)>,
    figcaption: bool,
) -> String {
    let mut img = format!(r#"<img src="{src}" alt="{}""#, escape_html(alt));
    if !title.is_empty() {
        img.push_str(&format!(r#" title="{}""#, escape_html(title)));
    }
    if let Some((width, height)) = size {
        img.push_str(&format!(r#" width="{width}""#));
        if let Some(height) = height {
            img.push_str(&format!(r#" height="{height}""#));
        }
    }
    img.push('>');
    if !figcaption {
        return img;
    }
    let caption = if alt.is_empty() {
        String::new()
    } else {
        format!("<figcaption>{}</figcaption>", escape_html(alt))
    };
    format!(
        r#"<figure style="display: flex; flex-direction: column; align-items: center;">{img}{caption}</figure>"#
    )
}
