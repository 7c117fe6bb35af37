use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use inkpost_logging::ink_warn;
use scraper::Html;

use crate::assets::{mime_for, AssetReader, AssetRegistry};
use crate::cache::CardStore;

/// Fallback URL when an upload reports a media id but no URL.
pub fn fallback_media_url(media_id: &str) -> String {
    format!("https://mmbiz.qlogo.cn/mmbiz_png/{media_id}/0?wx_fmt=png")
}

/// Article HTML as it is sent to the platform or the clipboard: uploaded
/// images point at their remote URLs, link attributes the editor rejects are
/// dropped and cards are swapped back to their original fragments.
pub fn finalize_content(html: &str, assets: &AssetRegistry, cards: &CardStore) -> String {
    let rewritten = assets.rewrite_sources(html);
    let stripped = rewritten
        .replace(r#" rel="noopener nofollow""#, "")
        .replace(r#"rel="noopener nofollow""#, "")
        .replace(r#" target="_blank""#, "")
        .replace(r#"target="_blank""#, "");
    cards.restore(&stripped)
}

/// Visible text of an HTML fragment, one block per line.
pub fn plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inlines every registered local image as a `data:` URI.
pub async fn embed_images(html: &str, assets: &AssetRegistry, reader: &dyn AssetReader) -> String {
    let mut output = html.to_string();
    for asset in assets.snapshot() {
        let bytes = match reader.read(&asset.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                ink_warn!("Leaving {:?} linked, read failed: {}", asset.path, err);
                continue;
            }
        };
        let data_uri = format!("data:{};base64,{}", mime_for(&asset.path), STANDARD.encode(bytes));
        output = output.replace(
            &format!("src=\"{}\"", asset.res_url),
            &format!("src=\"{data_uri}\""),
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_link_attributes_and_restores_cards() {
        let assets = AssetRegistry::new();
        let cards = CardStore::new();
        cards.set("gh_9", "<mp-profile data-id=\"gh_9\"></mp-profile>");

        let html = r#"<a href="https://x" rel="noopener nofollow" target="_blank">x</a><section data-id="gh_9" class="note-mpcard-wrapper"><div>c</div></section>"#;
        assert_eq!(
            finalize_content(html, &assets, &cards),
            r#"<a href="https://x">x</a><mp-profile data-id="gh_9"></mp-profile>"#
        );
    }

    #[test]
    fn plain_text_drops_markup() {
        let text = plain_text("<section><h1>Title</h1>\n<p>Hello <b>world</b></p></section>");
        assert_eq!(text, "Title\nHello world");
    }

    #[test]
    fn fallback_url_uses_media_id() {
        assert_eq!(
            fallback_media_url("abc"),
            "https://mmbiz.qlogo.cn/mmbiz_png/abc/0?wx_fmt=png"
        );
    }
}
