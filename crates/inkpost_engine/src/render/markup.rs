//! Obsidian syntax pulldown-cmark does not know: `%%comments%%` and
//! `==highlights==`.

use std::borrow::Cow;

/// Removes `%%...%%` comments outside fenced code. An unclosed `%%` is kept.
pub fn strip_comments(markdown: &str) -> Cow<'_, str> {
    if !markdown.contains("%%") {
        return Cow::Borrowed(markdown);
    }
    let mut out = String::with_capacity(markdown.len());
    let mut prose = String::new();
    let mut fence: Option<&str> = None;
    for line in markdown.split_inclusive('\n') {
        let marker = line.trim_start();
        match fence {
            Some(open) => {
                out.push_str(line);
                if marker.starts_with(open) {
                    fence = None;
                }
            }
            None if marker.starts_with("```") || marker.starts_with("~~~") => {
                out.push_str(&remove_comments(&prose));
                prose.clear();
                fence = Some(&marker[..3]);
                out.push_str(line);
            }
            None => prose.push_str(line),
        }
    }
    out.push_str(&remove_comments(&prose));
    Cow::Owned(out)
}

fn remove_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("%%") {
        let Some(len) = rest[start + 2..].find("%%") else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

/// A run of text split into plain and highlighted parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPart<'a> {
    Plain(&'a str),
    Highlight(&'a str),
}

/// Splits `==marked==` spans out of a text run. Returns `None` when there
/// is nothing to highlight.
pub fn split_highlights(text: &str) -> Option<Vec<TextPart<'_>>> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("==") {
        let inner = &rest[start + 2..];
        let Some(len) = inner.find("==") else {
            break;
        };
        if len == 0 {
            parts.push(TextPart::Plain(&rest[..start + 4]));
            rest = &inner[2..];
            continue;
        }
        if start > 0 {
            parts.push(TextPart::Plain(&rest[..start]));
        }
        parts.push(TextPart::Highlight(&inner[..len]));
        rest = &inner[len + 2..];
    }
    if !parts.iter().any(|part| matches!(part, TextPart::Highlight(_))) {
        return None;
    }
    if !rest.is_empty() {
        parts.push(TextPart::Plain(rest));
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn comments_are_removed_outside_code() {
        let text = "keep %%drop%% this\n%%\nwhole\nblock\n%%\n```\n%%kept in code%%\n```\n50%% off\n";
        assert_eq!(
            strip_comments(text),
            "keep  this\n\n```\n%%kept in code%%\n```\n50%% off\n"
        );
    }

    #[test]
    fn highlights_split_around_plain_text() {
        assert_eq!(
            split_highlights("a ==b== c"),
            Some(vec![
                TextPart::Plain("a "),
                TextPart::Highlight("b"),
                TextPart::Plain(" c")
            ])
        );
        assert_eq!(split_highlights("x == y"), None);
        assert_eq!(split_highlights("a ==== b"), None);
    }
}
