use super::{append_to_article, escape_html, Extension, RenderContext, RenderToken, SourceBlock, TokenKind};

/// How links to pages outside the platform are kept, since the editor strips
/// external `href`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStyle {
    /// `text[url]`
    #[default]
    Inline,
    /// `text[n]` plus a numbered list of URLs under the article.
    Footnote,
}

const PLATFORM_PREFIXES: &[&str] = &["https://mp.weixin.qq.com/mp", "https://mp.weixin.qq.com/s"];

pub struct LinkExtension;

#[async_trait::async_trait]
impl Extension for LinkExtension {
    fn name(&self) -> &'static str {
        "link"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        let SourceBlock::Link {
            dest,
            text,
            text_html,
        } = block
        else {
            return None;
        };
        if dest.is_empty() || dest.starts_with('#') {
            return None;
        }
        Some(RenderToken::new(
            TokenKind::Link {
                text: text.clone(),
                text_html: text_html.clone(),
            },
            dest.clone(),
        ))
    }

    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext) {
        let TokenKind::Link { text, text_html } = token.kind() else {
            return;
        };
        let href = token.raw();
        let html = if href.starts_with("mailto:") {
            text_html.clone()
        } else if text.starts_with(href)
            || PLATFORM_PREFIXES.iter().any(|prefix| href.starts_with(prefix))
        {
            format!(r#"<a href="{}">{text_html}</a>"#, escape_html(href))
        } else {
            let number = ctx.push_link(href);
            match ctx.options.link_style {
                LinkStyle::Footnote => format!("<a>{text_html}<sup>[{number}]</sup></a>"),
                LinkStyle::Inline => format!("<a>{text_html}[{}]</a>", escape_html(href)),
            }
        };
        token.set_rendered(html);
    }

    fn finish(&self, html: String, ctx: &RenderContext) -> String {
        if ctx.options.link_style != LinkStyle::Footnote || ctx.links().is_empty() {
            return html;
        }
        let items: String = ctx
            .links()
            .iter()
            .map(|href| format!("<li>{}&nbsp;↩</li>", escape_html(href)))
            .collect();
        append_to_article(
            html,
            &format!(r#"<section class="footnotes"><hr><ol>{items}</ol></section>"#),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::render::RenderOptions;

    fn link(dest: &str, text: &str) -> RenderToken {
        LinkExtension
            .tokenize(&SourceBlock::Link {
                dest: dest.into(),
                text: text.into(),
                text_html: text.into(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn mail_and_platform_links_are_not_numbered() {
        let mut ctx = RenderContext::new(RenderOptions::default(), PathBuf::from("."));
        let mut mail = link("mailto:a@b.c", "write me");
        let mut article = link("https://mp.weixin.qq.com/s/abc", "earlier post");
        LinkExtension.walk(&mut mail, &mut ctx).await;
        LinkExtension.walk(&mut article, &mut ctx).await;

        assert_eq!(mail.rendered_html(), Some("write me"));
        assert_eq!(
            article.rendered_html(),
            Some(r#"<a href="https://mp.weixin.qq.com/s/abc">earlier post</a>"#)
        );
        assert!(ctx.links().is_empty());
    }

    #[test]
    fn anchors_stay_with_the_markdown_renderer() {
        assert!(LinkExtension
            .tokenize(&SourceBlock::Link {
                dest: "#setup".into(),
                text: "setup".into(),
                text_html: "setup".into(),
            })
            .is_none());
    }
}
