use std::sync::Arc;

use inkpost_logging::ink_warn;
use pulldown_latex::{
    config::DisplayMode, config::RenderConfig, mathml::push_mathml, Parser, Storage,
};

use super::{
    escape_html, fence_lang, Extension, MathNotation, RenderContext, RenderToken, SourceBlock,
    TokenKind,
};
use crate::cache::ExpressionCache;

/// Renders `$...$`, `$$...$$` and `latex`/`tex`/`am`/`asciimath` fences.
///
/// Successful renders are memoized in the shared [`ExpressionCache`] under the
/// exact expression text; failures are rendered inline and never cached.
pub struct MathExtension {
    cache: Arc<ExpressionCache>,
}

impl MathExtension {
    pub fn new(cache: Arc<ExpressionCache>) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl Extension for MathExtension {
    fn name(&self) -> &'static str {
        "math"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        match block {
            SourceBlock::Math {
                expression,
                display,
            } => Some(RenderToken::new(
                TokenKind::Math {
                    display: *display,
                    notation: None,
                },
                expression.clone(),
            )),
            SourceBlock::Fence { info, text } => {
                let notation = match fence_lang(info)?.as_str() {
                    "latex" | "tex" => MathNotation::Latex,
                    "am" | "asciimath" => MathNotation::AsciiMath,
                    _ => return None,
                };
                Some(RenderToken::new(
                    TokenKind::Math {
                        display: true,
                        notation: Some(notation),
                    },
                    text.trim_end_matches('\n'),
                ))
            }
            SourceBlock::Image { .. } | SourceBlock::Link { .. } => None,
        }
    }

    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext) {
        let (display, notation) = match token.kind() {
            TokenKind::Math { display, notation } => {
                (*display, notation.unwrap_or(ctx.options.math_notation))
            }
            _ => return,
        };

        let expression = token.raw();
        let payload = match self.cache.get(expression) {
            Some(cached) => cached,
            None => match render_expression(expression, notation) {
                Ok(rendered) => {
                    self.cache.set(expression, rendered.clone());
                    rendered
                }
                Err(message) => error_markup(expression, &message),
            },
        };

        let id = ctx.next_math_id();
        let html = if display {
            format!(
                r#"<span id="math-id-{id}" class="block-math-svg"><section class="block-math-section">{payload}</section></span>"#
            )
        } else {
            format!(r#"<span id="math-id-{id}" class="inline-math-svg">{payload}</span>"#)
        };
        token.set_rendered(html);
    }
}

/// Renders an expression to the fragment stored in the cache.
///
/// LaTeX becomes inline-mode MathML so one cached fragment serves both inline
/// and block occurrences; AsciiMath is kept as escaped source.
pub fn render_expression(expression: &str, notation: MathNotation) -> Result<String, String> {
    match notation {
        MathNotation::AsciiMath => Ok(format!(
            r#"<code class="asciimath">{}</code>"#,
            escape_html(expression)
        )),
        MathNotation::Latex => {
            let storage = Storage::new();
            let parser = Parser::new(expression, &storage);
            let config = RenderConfig {
                display_mode: DisplayMode::Inline,
                ..Default::default()
            };

            let events: Vec<_> = parser.collect();
            let errors: Vec<String> = events
                .iter()
                .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
                .collect();
            if !errors.is_empty() {
                return Err(errors.join("; "));
            }

            let mut mathml = String::new();
            push_mathml(&mut mathml, events.into_iter(), config).map_err(|e| e.to_string())?;
            Ok(mathml)
        }
    }
}

fn error_markup(expression: &str, message: &str) -> String {
    ink_warn!("Math render failed for {expression:?}: {message}");
    format!(
        r#"<span class="math-error" title="{}"><code>{}</code></span>"#,
        escape_html(message),
        escape_html(expression)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latex_renders_to_mathml() {
        let html = render_expression("x^2", MathNotation::Latex).unwrap();
        assert!(html.contains("<math"));
        assert!(html.contains("<msup>"));
    }

    #[test]
    fn broken_latex_is_an_error() {
        assert!(render_expression(r"\frac{1}{", MathNotation::Latex).is_err());
    }

    #[tokio::test]
    async fn block_math_nests_a_section_inside_the_span() {
        let extension = MathExtension::new(Arc::new(ExpressionCache::new()));
        let mut ctx = RenderContext::new(
            crate::render::RenderOptions::default(),
            std::path::PathBuf::from("."),
        );
        let mut token = extension
            .tokenize(&SourceBlock::Math {
                expression: "x^2".into(),
                display: true,
            })
            .unwrap();
        extension.walk(&mut token, &mut ctx).await;

        let html = token.rendered_html().unwrap();
        assert!(html.starts_with(
            r#"<span id="math-id-1" class="block-math-svg"><section class="block-math-section"><math"#
        ));
        assert!(html.ends_with("</section></span>"));
    }
}
