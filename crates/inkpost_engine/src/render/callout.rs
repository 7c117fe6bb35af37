use super::escape_html;

/// A `> [!kind] Title` blockquote header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalloutHeader {
    pub kind: String,
    pub title: String,
}

/// Reads the first line of a blockquote. `[!tip]-` and `[!tip]+` (folding
/// markers) are accepted and ignored.
pub fn parse_callout_header(line: &str) -> Option<CalloutHeader> {
    let rest = line.trim_start().strip_prefix("[!")?;
    let (kind, after) = rest.split_once(']')?;
    let kind = kind.trim();
    if kind.is_empty() {
        return None;
    }
    let custom = after
        .strip_prefix(['-', '+'])
        .unwrap_or(after)
        .trim();
    let title = if custom.is_empty() {
        default_title(kind)
    } else {
        custom.to_string()
    };
    Some(CalloutHeader {
        kind: kind.to_ascii_lowercase(),
        title,
    })
}

fn default_title(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Style class and icon glyph; unknown kinds look like `note`.
fn appearance(kind: &str) -> (&'static str, &'static str) {
    match kind {
        "abstract" | "summary" | "tldr" | "tip" | "hint" | "important" => {
            ("note-callout-abstract", "✎")
        }
        "success" | "check" | "done" => ("note-callout-success", "✓"),
        "question" | "help" | "faq" => ("note-callout-question", "?"),
        "warning" | "caution" | "attention" => ("note-callout-question", "!"),
        "failure" | "fail" | "missing" | "danger" | "error" | "bug" => {
            ("note-callout-failure", "✗")
        }
        "example" => ("note-callout-example", "≡"),
        "quote" | "cite" => ("note-callout-quote", "❝"),
        _ => ("note-callout-note", "ℹ"),
    }
}

/// Markup up to and including the opening of the content section.
pub fn callout_open(header: &CalloutHeader) -> String {
    let (style, icon) = appearance(&header.kind);
    format!(
        r#"<section class="note-callout {style}"><section class="note-callout-title-wrap"><span class="note-callout-icon">{icon}</span><span class="note-callout-title">{}</span></section><section class="note-callout-content">"#,
        escape_html(&header.title)
    )
}

pub const CALLOUT_CLOSE: &str = "</section></section>\n";
