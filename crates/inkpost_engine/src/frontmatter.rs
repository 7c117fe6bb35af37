use inkpost_logging::ink_warn;
use yaml_rust2::{Yaml, YamlLoader};

pub const CROP_235_1: &str = "0_0_1_0.5";
pub const CROP_1_1: &str = "0_0.525_0.404_1";

/// Article settings read from the `---` block at the top of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleMeta {
    pub title: Option<String>,
    pub author: Option<String>,
    pub digest: Option<String>,
    pub content_source_url: Option<String>,
    /// Local file to upload as the cover.
    pub cover: Option<String>,
    /// Already-uploaded cover.
    pub thumb_media_id: Option<String>,
    pub need_open_comment: bool,
    pub only_fans_can_comment: bool,
    /// Account to publish with: an app id (`wx...`) or a configured account name.
    pub appid: Option<String>,
    pub crop: bool,
}

impl ArticleMeta {
    /// `(pic_crop_235_1, pic_crop_1_1)` when cropping was requested.
    pub fn crop_values(&self) -> Option<(&'static str, &'static str)> {
        self.crop.then_some((CROP_235_1, CROP_1_1))
    }
}

/// Splits a note into its front matter and the markdown body that follows.
/// Notes without a closed `---` block are returned whole.
pub fn split_front_matter(text: &str) -> (ArticleMeta, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (ArticleMeta::default(), text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (parse_meta(header), body.trim_start_matches(['\r', '\n']));
        }
        offset += line.len();
    }
    (ArticleMeta::default(), text)
}

fn parse_meta(header: &str) -> ArticleMeta {
    let source = quote_wiki_values(header);
    let docs = match YamlLoader::load_from_str(&source) {
        Ok(docs) => docs,
        Err(err) => {
            ink_warn!("Ignoring unreadable front matter: {err}");
            return ArticleMeta::default();
        }
    };
    let Some(doc) = docs.into_iter().next() else {
        return ArticleMeta::default();
    };
    if doc.as_hash().is_none() {
        return ArticleMeta::default();
    }

    let text = |key: &str| scalar_text(&doc[key]).filter(|value| !value.is_empty());
    let flag = |key: &str| is_truthy(&doc[key]);
    ArticleMeta {
        title: text("title"),
        author: text("author"),
        digest: text("digest").map(|digest| digest.trim_end().to_string()),
        content_source_url: text("content_source_url"),
        cover: text("cover"),
        thumb_media_id: text("thumb_media_id"),
        need_open_comment: flag("need_open_comment"),
        only_fans_can_comment: flag("only_fans_can_comment"),
        appid: text("appid"),
        crop: flag("crop"),
    }
}

/// Obsidian writes `cover: ![[c.png]]` unquoted, which YAML reads as a tag
/// and a flow sequence. Such values are quoted before parsing.
fn quote_wiki_values(header: &str) -> String {
    header
        .lines()
        .map(|line| match line.split_once(':') {
            Some((key, value))
                if !key.starts_with([' ', '\t'])
                    && (value.trim_start().starts_with("![[")
                        || value.trim_start().starts_with("[[")) =>
            {
                let value = value.trim();
                format!("{key}: '{}'", value.replace('\'', "''"))
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn scalar_text(value: &Yaml) -> Option<String> {
    let raw = match value {
        Yaml::String(text) | Yaml::Real(text) => text.clone(),
        Yaml::Integer(number) => number.to_string(),
        Yaml::Boolean(flag) => flag.to_string(),
        _ => return None,
    };
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix("![[")
        .or_else(|| trimmed.strip_prefix("[["))
        .and_then(|inner| inner.strip_suffix("]]"))
        .unwrap_or(trimmed);
    Some(unwrapped.trim().to_string())
}

fn is_truthy(value: &Yaml) -> bool {
    match value {
        Yaml::Boolean(flag) => *flag,
        Yaml::Integer(number) => *number == 1,
        Yaml::String(text) => matches!(
            text.to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "on"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_keys_and_unwraps_links() {
        let text = "---\ntitle: \"Hello: World\"\ncover: ![[covers/c.png]]\nneed_open_comment: true\ncrop: yes\nappid: wx123\nunknown: x\n---\n\n# Body\n";
        let (meta, body) = split_front_matter(text);

        assert_eq!(meta.title.as_deref(), Some("Hello: World"));
        assert_eq!(meta.cover.as_deref(), Some("covers/c.png"));
        assert!(meta.need_open_comment);
        assert!(!meta.only_fans_can_comment);
        assert_eq!(meta.appid.as_deref(), Some("wx123"));
        assert_eq!(meta.crop_values(), Some((CROP_235_1, CROP_1_1)));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn yaml_quoting_folding_and_comments_are_honoured() {
        let text = "---\ntitle: 'It''s here'\ndigest: >\n  A short trip\n  to the coast\nauthor: Ann # editor\ncover: \"[[c.png]]\"\nneed_open_comment: 1\n---\nBody";
        let (meta, body) = split_front_matter(text);

        assert_eq!(meta.title.as_deref(), Some("It's here"));
        assert_eq!(meta.digest.as_deref(), Some("A short trip to the coast"));
        assert_eq!(meta.author.as_deref(), Some("Ann"));
        assert_eq!(meta.cover.as_deref(), Some("c.png"));
        assert!(meta.need_open_comment);
        assert_eq!(body, "Body");
    }

    #[test]
    fn malformed_yaml_yields_empty_meta_but_strips_the_block() {
        let text = "---\ntitle: [unclosed\n---\nBody";
        let (meta, body) = split_front_matter(text);
        assert_eq!(meta, ArticleMeta::default());
        assert_eq!(body, "Body");
    }

    #[test]
    fn unterminated_block_is_left_alone() {
        let text = "---\ntitle: nope\n# Body";
        let (meta, body) = split_front_matter(text);
        assert_eq!(meta, ArticleMeta::default());
        assert_eq!(body, text);
    }
}
