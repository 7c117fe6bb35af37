//! Theme CSS inlined into `style` attributes.
//!
//! The article editor drops `<style>` blocks, so every rule whose selector
//! matches an element is folded into that element's `style` attribute. Rules
//! apply in source order; declarations already inline on an element win.
//! Selectors `scraper` cannot match statically (`:hover`, `::before`) and
//! at-rules are skipped.

use std::collections::HashMap;

use ego_tree::{NodeId, NodeRef};
use inkpost_logging::ink_debug;
use scraper::node::Node;
use scraper::{Html, Selector};

use super::{escape_html, Extension, RenderContext, RenderToken, SourceBlock};

/// Built-in article theme.
pub const DEFAULT_THEME_CSS: &str = r#"
.inkpost { font-size: 16px; line-height: 1.75; color: #2d3748; }
.inkpost h1 { font-size: 1.6em; margin: 1.2em 0 0.8em; }
.inkpost h2 { font-size: 1.35em; margin: 1.2em 0 0.6em; border-bottom: 1px solid #e2e8f0; }
.inkpost h3 { font-size: 1.15em; margin: 1em 0 0.5em; }
.inkpost p { margin: 0.8em 0; }
.inkpost blockquote { margin: 1em 0; padding: 0.5em 1em; border-left: 4px solid #cbd5e0; color: #4a5568; }
.inkpost a { color: #2b6cb0; }
.inkpost img { max-width: 100%; }
.inkpost figcaption { font-size: 0.85em; color: #718096; text-align: center; }
.note-highlight { background-color: #fefcbf; }
.note-callout { padding: 1em 1em 1em 1.5em; margin: 1em 0; border-radius: 4px; }
.note-callout-title-wrap { font-weight: 600; }
.note-callout-title { margin-left: 0.25em; }
.note-callout-note { color: rgb(8, 109, 221); background-color: rgba(8, 109, 221, 0.1); }
.note-callout-abstract { color: rgb(0, 191, 188); background-color: rgba(0, 191, 188, 0.1); }
.note-callout-success { color: rgb(8, 185, 78); background-color: rgba(8, 185, 78, 0.1); }
.note-callout-question { color: rgb(236, 117, 0); background-color: rgba(236, 117, 0, 0.1); }
.note-callout-failure { color: rgb(233, 49, 71); background-color: rgba(233, 49, 71, 0.1); }
.note-callout-example { color: rgb(120, 82, 238); background-color: rgba(120, 82, 238, 0.1); }
.note-callout-quote { color: rgb(158, 158, 158); background-color: rgba(158, 158, 158, 0.1); }
.note-callout-content { color: rgb(34, 34, 34); }
.footnotes { font-size: 0.85em; color: #718096; }
.fnref-sup { color: #2b6cb0; }
"#;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct StyleRule {
    selector: Selector,
    declarations: Vec<(String, String)>,
}

/// A parsed stylesheet, ready to inline.
pub struct Stylesheet {
    rules: Vec<StyleRule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let css = strip_comments(css);
        let mut rules = Vec::new();
        for (prelude, body) in split_blocks(&css) {
            if prelude.starts_with('@') {
                continue;
            }
            let declarations = parse_declarations(body);
            if declarations.is_empty() {
                continue;
            }
            for part in prelude.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match Selector::parse(part) {
                    Ok(selector) => rules.push(StyleRule {
                        selector,
                        declarations: declarations.clone(),
                    }),
                    Err(err) => ink_debug!("Skipping selector {part:?}: {err}"),
                }
            }
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `html` with every matching rule folded into `style`.
    pub fn inline(&self, html: &str) -> String {
        if self.rules.is_empty() {
            return html.to_string();
        }
        let fragment = Html::parse_fragment(html);
        let mut computed = Computed::new();
        for rule in &self.rules {
            for element in fragment.select(&rule.selector) {
                let styles = computed.entry(NodeRef::id(&element)).or_default();
                for (property, value) in &rule.declarations {
                    set_property(styles, property, value);
                }
            }
        }

        let mut out = String::with_capacity(html.len() * 2);
        for child in fragment.root_element().children() {
            write_node(child, &computed, &mut out);
        }
        out
    }
}

/// Inlines the theme into the finished article.
pub struct StyleExtension {
    sheet: Stylesheet,
}

impl StyleExtension {
    pub fn new(css: &str) -> Self {
        Self {
            sheet: Stylesheet::parse(css),
        }
    }
}

#[async_trait::async_trait]
impl Extension for StyleExtension {
    fn name(&self) -> &'static str {
        "style"
    }

    fn tokenize(&self, _block: &SourceBlock) -> Option<RenderToken> {
        None
    }

    async fn walk(&self, _token: &mut RenderToken, _ctx: &mut RenderContext) {}

    fn finish(&self, html: String, _ctx: &RenderContext) -> String {
        if self.sheet.is_empty() {
            return html;
        }
        self.sheet.inline(&html)
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Top-level `prelude { body }` pairs. Nested blocks (inside `@media`) stay
/// in the body of their at-rule.
fn split_blocks(css: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0;
    let mut body_start = 0;
    for (index, c) in css.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    body_start = index + 1;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let prelude = css[prelude_start..body_start - 1].trim();
                    blocks.push((prelude, &css[body_start..index]));
                    prelude_start = index + 1;
                }
            }
            ';' if depth == 0 => prelude_start = index + 1,
            _ => {}
        }
    }
    blocks
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            (!property.is_empty() && !value.is_empty()).then(|| (property, value.to_string()))
        })
        .collect()
}

fn set_property(styles: &mut Vec<(String, String)>, property: &str, value: &str) {
    match styles.iter_mut().find(|(name, _)| name == property) {
        Some(existing) => existing.1 = value.to_string(),
        None => styles.push((property.to_string(), value.to_string())),
    }
}

type Computed = HashMap<NodeId, Vec<(String, String)>>;

fn write_node(node: NodeRef<'_, Node>, computed: &Computed, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(element) => {
            let name = element.name();
            out.push('<');
            out.push_str(name);

            let mut styles = computed.get(&node.id()).cloned().unwrap_or_default();
            for (attr, value) in element.attrs() {
                if attr == "style" {
                    for (property, value) in parse_declarations(value) {
                        set_property(&mut styles, &property, &value);
                    }
                    continue;
                }
                out.push_str(&format!(r#" {attr}="{}""#, escape_html(value)));
            }
            if !styles.is_empty() {
                let style: Vec<String> = styles
                    .iter()
                    .map(|(property, value)| format!("{property}: {value}"))
                    .collect();
                out.push_str(&format!(r#" style="{}""#, escape_html(&style.join("; "))));
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                write_node(child, computed, out);
            }
            out.push_str(&format!("</{name}>"));
        }
        Node::Comment(_) => {}
        _ => {
            for child in node.children() {
                write_node(child, computed, out);
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
