use std::sync::LazyLock;

use inkpost_logging::ink_debug;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::html::{styled_line_to_highlighted_html, IncludeBackground};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use super::{escape_html, fence_lang, Extension, RenderContext, RenderOptions, RenderToken, SourceBlock, TokenKind};

pub const DEFAULT_CODE_THEME: &str = "InspiredGitHub";

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Claims every fenced or indented code block not taken by an earlier extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeExtension;

#[async_trait::async_trait]
impl Extension for CodeExtension {
    fn name(&self) -> &'static str {
        "code"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        let SourceBlock::Fence { info, text } = block else {
            return None;
        };
        Some(RenderToken::new(
            TokenKind::Code {
                lang: fence_lang(info),
            },
            text.clone(),
        ))
    }

    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext) {
        let lang = match token.kind() {
            TokenKind::Code { lang } => lang.clone(),
            _ => return,
        };
        let html = render_code(token.raw(), lang.as_deref(), &ctx.options);
        token.set_rendered(html);
    }
}

/// Highlighted, whitespace-preserving code section: one `<code>` per line,
/// optional `<ul>` gutter when line numbers are on.
pub fn render_code(code: &str, lang: Option<&str>, options: &RenderOptions) -> String {
    let code = code.strip_suffix('\n').unwrap_or(code);
    let highlighted = match highlight(code, lang, &options.code_theme) {
        Ok(html) => html,
        Err(err) => {
            ink_debug!("Highlighting {lang:?} failed, using plain text: {err}");
            escape_html(code)
        }
    };

    let spaced = replace_spaces(&highlighted);
    let mut body = String::new();
    let mut gutter = String::new();
    for (number, line) in spaced.split('\n').enumerate() {
        let text = if line.is_empty() { "<br>" } else { line };
        body.push_str("<code>");
        body.push_str(text);
        body.push_str("</code>");
        gutter.push_str(&format!("<li>{}</li>", number + 1));
    }

    let mut section = String::from(r#"<section class="code-section code-snippet__fix hljs">"#);
    if options.line_numbers {
        section.push_str("<ul>");
        section.push_str(&gutter);
        section.push_str("</ul>");
    }
    match lang {
        Some(lang) => section.push_str(&format!(
            r#"<pre style="max-width:1000% !important;" class="hljs language-{}">{body}</pre></section>"#,
            escape_html(lang)
        )),
        None => section.push_str(&format!("<pre>{body}</pre></section>")),
    }
    section
}

fn find_syntax(code: &str, lang: Option<&str>) -> &'static SyntaxReference {
    lang.and_then(|lang| SYNTAX_SET.find_syntax_by_token(lang))
        .or_else(|| {
            code.lines()
                .next()
                .and_then(|first| SYNTAX_SET.find_syntax_by_first_line(first))
        })
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text())
}

/// Inline-styled HTML, lines separated by `\n`.
fn highlight(code: &str, lang: Option<&str>, theme_name: &str) -> Result<String, String> {
    let theme = THEME_SET
        .themes
        .get(theme_name)
        .or_else(|| THEME_SET.themes.get(DEFAULT_CODE_THEME))
        .ok_or_else(|| format!("theme {theme_name} not found"))?;
    let syntax = find_syntax(code, lang);
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(code) {
        let regions = highlighter
            .highlight_line(line, &SYNTAX_SET)
            .map_err(|err| err.to_string())?;
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            lines.push(String::new());
            continue;
        }
        let html = styled_line_to_highlighted_html(&regions, IncludeBackground::No)
            .map_err(|err| err.to_string())?;
        lines.push(html.replace('\n', ""));
    }
    Ok(lines.join("\n"))
}

/// Spaces and tabs outside of tags become `&nbsp;` so the editor keeps indentation.
fn replace_spaces(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => {
                in_tag = true;
                result.push(c);
            }
            '>' => {
                in_tag = false;
                result.push(c);
            }
            ' ' if !in_tag => result.push_str("&nbsp;"),
            '\t' if !in_tag => result.push_str("&nbsp;&nbsp;&nbsp;&nbsp;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_inside_tags_are_kept() {
        assert_eq!(
            replace_spaces("<span style=\"a b\">x y</span>\tz"),
            "<span style=\"a b\">x&nbsp;y</span>&nbsp;&nbsp;&nbsp;&nbsp;z"
        );
    }

    #[test]
    fn plain_fence_wraps_lines_and_blank_lines() {
        let html = render_code("a\n\nb\n", None, &RenderOptions::default());
        assert!(html.starts_with(r#"<section class="code-section code-snippet__fix hljs"><pre>"#));
        assert_eq!(html.matches("<code>").count(), 3);
        assert!(html.contains("<code><br></code>"));
        assert!(!html.contains("<ul>"));
    }

    #[test]
    fn gutter_follows_line_numbers_option() {
        let options = RenderOptions {
            line_numbers: true,
            ..RenderOptions::default()
        };
        let html = render_code("fn main() {}\nlet x = 1;", Some("rust"), &options);
        assert!(html.contains("<ul><li>1</li><li>2</li></ul>"));
        assert!(html.contains(r#"class="hljs language-rust""#));
        assert!(html.contains("style="));
    }

    #[test]
    fn unknown_language_never_fails() {
        let html = render_code("<b>&</b>", Some("no-such-lang"), &RenderOptions::default());
        assert!(html.contains("language-no-such-lang"));
        assert!(html.contains("&lt;b&gt;"));
    }
}
