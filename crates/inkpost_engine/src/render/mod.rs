//! Markdown to article HTML.
//!
//! The pipeline walks pulldown-cmark events, offers every fenced block, math
//! span and image to the registered extensions in order, and lets the first
//! extension that claims a block turn it into a [`RenderToken`]. Tokens are
//! then walked one at a time (the walk step may await) and spliced back into
//! the event stream as raw HTML. Blocks nobody claims render as plain
//! markdown. Callouts, highlights and footnotes are rewritten in the event
//! stream itself; once the body is assembled every extension gets a
//! [`Extension::finish`] pass over the whole article.
mod callout;
mod card;
mod code;
mod diagram;
mod image;
mod link;
mod markup;
mod math;
mod style;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inkpost_logging::{ink_debug, ink_warn};
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};

use crate::assets::{AssetRegistry, PathResolver};
use crate::cache::{CardStore, ExpressionCache};
use crate::frontmatter::ArticleMeta;
use crate::source::SourceDocument;

pub use card::{parse_card, CardExtension, CardFields};
pub use code::{render_code, CodeExtension, DEFAULT_CODE_THEME};
pub use diagram::{DiagramExtension, DiagramHost, DiagramJob, DiagramQueue};
pub use image::LocalImageExtension;
pub use link::{LinkExtension, LinkStyle};
pub use markup::{split_highlights, strip_comments, TextPart};
pub use math::{render_expression, MathExtension};
pub use style::{StyleExtension, Stylesheet, DEFAULT_THEME_CSS};

use callout::{callout_open, parse_callout_header, CALLOUT_CLOSE};
use image::image_markup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MathNotation {
    #[default]
    Latex,
    AsciiMath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Adds a line-number gutter to code blocks.
    pub line_numbers: bool,
    /// Notation assumed for `$...$` and `$$...$$` spans.
    pub math_notation: MathNotation,
    pub code_theme: String,
    pub link_style: LinkStyle,
    /// Wraps captioned images in `<figure>` with a `<figcaption>`.
    pub figcaption: bool,
    /// Stylesheet folded into `style` attributes; `None` leaves markup bare.
    pub theme_css: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            line_numbers: false,
            math_notation: MathNotation::Latex,
            code_theme: DEFAULT_CODE_THEME.to_string(),
            link_style: LinkStyle::default(),
            figcaption: false,
            theme_css: None,
        }
    }
}

/// A markdown construct offered to the extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceBlock {
    Fence {
        info: String,
        text: String,
    },
    Math {
        expression: String,
        display: bool,
    },
    Image {
        dest: String,
        alt: String,
        title: String,
        embed: bool,
    },
    Link {
        dest: String,
        /// Visible text, for comparing against the URL.
        text: String,
        text_html: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Code {
        lang: Option<String>,
    },
    Math {
        display: bool,
        /// Set by math fences; `$` spans use the render options.
        notation: Option<MathNotation>,
    },
    Diagram,
    Card,
    LocalImage {
        alt: String,
        title: String,
        embed: bool,
    },
    Link {
        text: String,
        text_html: String,
    },
}

/// A claimed block. `rendered_html` is written once by the owning extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderToken {
    kind: TokenKind,
    raw: String,
    rendered_html: Option<String>,
}

impl RenderToken {
    pub fn new(kind: TokenKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            rendered_html: None,
        }
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn rendered_html(&self) -> Option<&str> {
        self.rendered_html.as_deref()
    }

    /// Returns false and keeps the existing value if already rendered.
    pub fn set_rendered(&mut self, html: String) -> bool {
        if self.rendered_html.is_some() {
            return false;
        }
        self.rendered_html = Some(html);
        true
    }
}

/// Per-document state handed to every walk.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub options: RenderOptions,
    pub base_dir: PathBuf,
    diagram_index: usize,
    math_index: usize,
    links: Vec<String>,
}

impl RenderContext {
    pub fn new(options: RenderOptions, base_dir: PathBuf) -> Self {
        Self {
            options,
            base_dir,
            diagram_index: 0,
            math_index: 0,
            links: Vec::new(),
        }
    }

    /// Index the next diagram will take; advanced once it is registered.
    pub fn diagram_index(&self) -> usize {
        self.diagram_index
    }

    pub fn advance_diagram(&mut self) {
        self.diagram_index += 1;
    }

    pub fn next_math_id(&mut self) -> usize {
        self.math_index += 1;
        self.math_index
    }

    /// Records an external link; returns its 1-based number.
    pub fn push_link(&mut self, href: &str) -> usize {
        self.links.push(href.to_string());
        self.links.len()
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }
}

#[async_trait::async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;

    /// Claims a block by returning a token for it.
    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken>;

    /// Fills in `rendered_html`. Must not fail; errors become inline markup.
    async fn walk(&self, token: &mut RenderToken, ctx: &mut RenderContext);

    fn render(&self, token: &RenderToken) -> String {
        match token.rendered_html() {
            Some(html) => html.to_string(),
            None => error_span(&format!("{} render failed", self.name())),
        }
    }

    /// Runs once over the wrapped article after every token is rendered.
    fn finish(&self, html: String, _ctx: &RenderContext) -> String {
        html
    }
}

/// Long-lived registries shared by the pipeline and the publisher.
#[derive(Clone)]
pub struct RenderServices {
    pub expressions: Arc<ExpressionCache>,
    pub cards: Arc<CardStore>,
    pub assets: Arc<AssetRegistry>,
    pub diagrams: Arc<dyn DiagramHost>,
    pub resolver: Arc<dyn PathResolver>,
}

impl RenderServices {
    pub fn new(diagrams: Arc<dyn DiagramHost>, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            expressions: Arc::new(ExpressionCache::new()),
            cards: Arc::new(CardStore::new()),
            assets: Arc::new(AssetRegistry::new()),
            diagrams,
            resolver,
        }
    }

    /// Drops per-document state. The expression cache is kept.
    pub fn reset_document(&self) {
        self.cards.clear();
        self.assets.clear();
    }
}

/// A rendered note, ready for post-processing.
#[derive(Debug, Clone)]
pub struct RenderedArticle {
    pub path: Option<PathBuf>,
    pub title: String,
    pub meta: ArticleMeta,
    /// Markdown body, kept for section lookups.
    pub markdown: String,
    pub html: String,
}

impl RenderedArticle {
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

enum Item<'a> {
    Event(Event<'a>),
    Token { index: usize, inline: bool },
    FootnoteRef(String),
}

/// Parser events with a queue in front, so a look-ahead can be handed back.
struct EventSource<'a> {
    parser: Parser<'a>,
    pending: VecDeque<Event<'a>>,
}

impl<'a> EventSource<'a> {
    fn new(parser: Parser<'a>) -> Self {
        Self {
            parser,
            pending: VecDeque::new(),
        }
    }

    fn requeue(&mut self, events: Vec<Event<'a>>) {
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
    }
}

impl<'a> Iterator for EventSource<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        self.pending.pop_front().or_else(|| self.parser.next())
    }
}

/// Body items, with footnote definitions collected on the side.
#[derive(Default)]
struct Output<'a> {
    body: Vec<Item<'a>>,
    notes: Vec<(String, Vec<Item<'a>>)>,
    in_note: bool,
}

impl<'a> Output<'a> {
    fn push(&mut self, item: Item<'a>) {
        match self.notes.last_mut() {
            Some((_, items)) if self.in_note => items.push(item),
            _ => self.body.push(item),
        }
    }

    fn event(&mut self, event: Event<'a>) {
        self.push(Item::Event(event));
    }

    fn html(&mut self, html: String) {
        self.push(Item::Event(Event::Html(CowStr::from(html))));
    }

    fn inline_html(&mut self, html: String) {
        self.push(Item::Event(Event::InlineHtml(CowStr::from(html))));
    }
}

pub struct Pipeline {
    extensions: Vec<Box<dyn Extension>>,
    services: RenderServices,
    options: RenderOptions,
}

impl Pipeline {
    /// Pipeline with the standard extensions: math, diagram, card, local
    /// image, link and code, plus theme inlining when a theme is set.
    pub fn new(services: RenderServices, options: RenderOptions) -> Self {
        let mut extensions: Vec<Box<dyn Extension>> = vec![
            Box::new(MathExtension::new(services.expressions.clone())),
            Box::new(DiagramExtension::new(services.diagrams.clone())),
            Box::new(CardExtension::new(services.cards.clone())),
            Box::new(LocalImageExtension::new(
                services.assets.clone(),
                services.resolver.clone(),
            )),
            Box::new(LinkExtension),
            Box::new(CodeExtension),
        ];
        if let Some(css) = options.theme_css.as_deref() {
            extensions.push(Box::new(StyleExtension::new(css)));
        }
        Self::with_extensions(services, options, extensions)
    }

    pub fn with_extensions(
        services: RenderServices,
        options: RenderOptions,
        extensions: Vec<Box<dyn Extension>>,
    ) -> Self {
        Self {
            extensions,
            services,
            options,
        }
    }

    pub fn services(&self) -> &RenderServices {
        &self.services
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub async fn render(&self, doc: &SourceDocument) -> RenderedArticle {
        self.services.reset_document();

        let markdown = strip_comments(&doc.body);
        let mut source = EventSource::new(Parser::new_ext(&markdown, markdown_options()));
        let mut out = Output::default();
        let mut tokens: Vec<(usize, RenderToken)> = Vec::new();
        let mut quotes: Vec<bool> = Vec::new();

        while let Some(event) = source.next() {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let mut text = String::new();
                    for inner in source.by_ref() {
                        match inner {
                            Event::End(TagEnd::CodeBlock) => break,
                            Event::Text(chunk) => text.push_str(&chunk),
                            _ => {}
                        }
                    }
                    let info = match &kind {
                        CodeBlockKind::Fenced(info) => info.to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    let block = SourceBlock::Fence { info, text };
                    match self.claim(&block) {
                        Some(claimed) => keep(&mut out, &mut tokens, claimed, false),
                        None => {
                            let SourceBlock::Fence { text, .. } = block else {
                                continue;
                            };
                            out.event(Event::Start(Tag::CodeBlock(kind)));
                            out.event(Event::Text(CowStr::from(text)));
                            out.event(Event::End(TagEnd::CodeBlock));
                        }
                    }
                }
                Event::InlineMath(ref expression) | Event::DisplayMath(ref expression) => {
                    let display = matches!(event, Event::DisplayMath(_));
                    let block = SourceBlock::Math {
                        expression: expression.to_string(),
                        display,
                    };
                    match self.claim(&block) {
                        Some(claimed) => keep(&mut out, &mut tokens, claimed, true),
                        None => out.event(event),
                    }
                }
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let mut inner_events = Vec::new();
                    let mut alt = String::new();
                    for inner in source.by_ref() {
                        if matches!(inner, Event::End(TagEnd::Image)) {
                            break;
                        }
                        if let Event::Text(text) | Event::Code(text) = &inner {
                            alt.push_str(text);
                        }
                        inner_events.push(inner);
                    }
                    let block = SourceBlock::Image {
                        dest: dest_url.to_string(),
                        alt,
                        title: title.to_string(),
                        embed: matches!(link_type, LinkType::WikiLink { .. }),
                    };
                    match self.claim(&block) {
                        Some(claimed) => keep(&mut out, &mut tokens, claimed, true),
                        None if self.options.figcaption && !dest_url.is_empty() => {
                            let SourceBlock::Image { alt, .. } = &block else {
                                continue;
                            };
                            out.inline_html(image_markup(
                                &escape_html(&dest_url),
                                alt,
                                &title,
                                None,
                                true,
                            ));
                        }
                        None => {
                            out.event(Event::Start(Tag::Image {
                                link_type,
                                dest_url,
                                title,
                                id,
                            }));
                            for inner in inner_events {
                                out.event(inner);
                            }
                            out.event(Event::End(TagEnd::Image));
                        }
                    }
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let mut inner_events = Vec::new();
                    for inner in source.by_ref() {
                        if matches!(inner, Event::End(TagEnd::Link)) {
                            break;
                        }
                        inner_events.push(inner);
                    }
                    let plain = !matches!(link_type, LinkType::WikiLink { .. })
                        && inner_events.iter().all(|inner| {
                            !matches!(
                                inner,
                                Event::Start(Tag::Image { .. })
                                    | Event::InlineMath(_)
                                    | Event::DisplayMath(_)
                                    | Event::FootnoteReference(_)
                            )
                        });
                    let claimed = plain.then(|| link_block(&dest_url, &inner_events)).and_then(
                        |block| self.claim(&block),
                    );
                    match claimed {
                        Some(claimed) => keep(&mut out, &mut tokens, claimed, true),
                        None => {
                            out.event(Event::Start(Tag::Link {
                                link_type,
                                dest_url,
                                title,
                                id,
                            }));
                            inner_events.push(Event::End(TagEnd::Link));
                            source.requeue(inner_events);
                        }
                    }
                }
                Event::Start(Tag::BlockQuote(kind)) => {
                    let mut lookahead = Vec::new();
                    let mut first_line = String::new();
                    if let Some(next) = source.next() {
                        let opens_paragraph = matches!(next, Event::Start(Tag::Paragraph));
                        lookahead.push(next);
                        if opens_paragraph {
                            for inner in source.by_ref() {
                                let is_text = matches!(inner, Event::Text(_));
                                if let Event::Text(text) = &inner {
                                    first_line.push_str(text);
                                }
                                lookahead.push(inner);
                                if !is_text {
                                    break;
                                }
                            }
                        }
                    }
                    match parse_callout_header(&first_line) {
                        Some(header) => {
                            quotes.push(true);
                            out.html(callout_open(&header));
                            // the header line is consumed; the rest of its
                            // paragraph, if any, becomes body text
                            match lookahead.pop() {
                                Some(Event::SoftBreak | Event::HardBreak) => {
                                    out.event(Event::Start(Tag::Paragraph));
                                }
                                Some(Event::End(TagEnd::Paragraph)) | None => {}
                                Some(other) => {
                                    out.event(Event::Start(Tag::Paragraph));
                                    source.requeue(vec![other]);
                                }
                            }
                        }
                        None => {
                            quotes.push(false);
                            out.event(Event::Start(Tag::BlockQuote(kind)));
                            source.requeue(lookahead);
                        }
                    }
                }
                Event::End(TagEnd::BlockQuote(kind)) => {
                    if quotes.pop().unwrap_or(false) {
                        out.html(CALLOUT_CLOSE.to_string());
                    } else {
                        out.event(Event::End(TagEnd::BlockQuote(kind)));
                    }
                }
                Event::Start(Tag::FootnoteDefinition(label)) => {
                    out.notes.push((label.to_string(), Vec::new()));
                    out.in_note = true;
                }
                Event::End(TagEnd::FootnoteDefinition) => out.in_note = false,
                Event::FootnoteReference(label) => out.push(Item::FootnoteRef(label.to_string())),
                Event::Text(text) => match split_highlights(&text) {
                    Some(parts) => {
                        for part in parts {
                            match part {
                                TextPart::Plain(plain) => {
                                    out.event(Event::Text(CowStr::from(plain.to_string())))
                                }
                                TextPart::Highlight(marked) => out.inline_html(format!(
                                    r#"<span class="note-highlight">{}</span>"#,
                                    escape_html(marked)
                                )),
                            }
                        }
                    }
                    None => out.event(Event::Text(text.clone())),
                },
                other => out.event(other),
            }
        }

        let mut ctx = RenderContext::new(self.options.clone(), doc.base_dir());
        for (owner, token) in tokens.iter_mut() {
            self.extensions[*owner].walk(token, &mut ctx).await;
        }
        ink_debug!(
            "Rendered {} claimed blocks for {:?}",
            tokens.len(),
            doc.title
        );

        let numbers: HashMap<String, usize> = out
            .notes
            .iter()
            .enumerate()
            .map(|(index, (label, _))| (label.clone(), index + 1))
            .collect();
        let mut body = String::new();
        html::push_html(
            &mut body,
            out.body
                .into_iter()
                .map(|item| self.emit(item, &tokens, &numbers)),
        );
        if !out.notes.is_empty() {
            body.push_str(r#"<section class="footnotes"><hr><ol>"#);
            for (label, items) in out.notes {
                let mut note = String::new();
                html::push_html(
                    &mut note,
                    items
                        .into_iter()
                        .map(|item| self.emit(item, &tokens, &numbers)),
                );
                body.push_str(&format!(
                    r#"<li id="fn-{}">{note}</li>"#,
                    escape_html(&label)
                ));
            }
            body.push_str("</ol></section>");
        }

        let mut html = format!(r#"<section class="inkpost" id="article-section">{body}</section>"#);
        for extension in &self.extensions {
            html = extension.finish(html, &ctx);
        }

        RenderedArticle {
            path: doc.path.clone(),
            title: doc.title.clone(),
            meta: doc.meta.clone(),
            markdown: doc.body.clone(),
            html,
        }
    }

    fn claim(&self, block: &SourceBlock) -> Option<(usize, RenderToken)> {
        self.extensions
            .iter()
            .enumerate()
            .find_map(|(index, ext)| ext.tokenize(block).map(|token| (index, token)))
    }

    fn emit<'a>(
        &self,
        item: Item<'a>,
        tokens: &[(usize, RenderToken)],
        numbers: &HashMap<String, usize>,
    ) -> Event<'a> {
        match item {
            Item::Event(event) => event,
            Item::Token { index, inline } => {
                let (owner, token) = &tokens[index];
                let fragment = self.extensions[*owner].render(token);
                if inline {
                    Event::InlineHtml(CowStr::from(fragment))
                } else {
                    Event::Html(CowStr::from(format!("{fragment}\n")))
                }
            }
            Item::FootnoteRef(label) => match numbers.get(&label) {
                Some(number) => Event::InlineHtml(CowStr::from(format!(
                    r#"<sup id="fnref-{number}" class="fnref-sup">{number}</sup>"#
                ))),
                None => Event::Text(CowStr::from(format!("[^{label}]"))),
            },
        }
    }
}

fn keep(
    out: &mut Output<'_>,
    tokens: &mut Vec<(usize, RenderToken)>,
    claimed: (usize, RenderToken),
    inline: bool,
) {
    out.push(Item::Token {
        index: tokens.len(),
        inline,
    });
    tokens.push(claimed);
}

fn link_block(dest: &str, inner: &[Event<'_>]) -> SourceBlock {
    let text: String = inner
        .iter()
        .filter_map(|event| match event {
            Event::Text(text) | Event::Code(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect();
    let mut text_html = String::new();
    html::push_html(&mut text_html, inner.iter().cloned());
    SourceBlock::Link {
        dest: dest.to_string(),
        text,
        text_html,
    }
}

/// Inserts `extra` at the end of the article section.
pub(crate) fn append_to_article(mut html: String, extra: &str) -> String {
    const CLOSE: &str = "</section>";
    if html.ends_with(CLOSE) {
        html.insert_str(html.len() - CLOSE.len(), extra);
    } else {
        html.push_str(extra);
    }
    html
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_MATH
        | Options::ENABLE_WIKILINKS
}

/// First word of a fence info string, lower-cased.
pub(crate) fn fence_lang(info: &str) -> Option<String> {
    info.split_whitespace()
        .next()
        .map(|word| word.trim().to_ascii_lowercase())
        .filter(|word| !word.is_empty())
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn error_span(message: &str) -> String {
    ink_warn!("{message}");
    format!(r#"<span class="render-error">{}</span>"#, escape_html(message))
}
