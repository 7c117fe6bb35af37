use std::path::Path;
use std::sync::Arc;

use inkpost_core::UploadState;
use inkpost_engine::render::{DiagramQueue, LinkStyle, DEFAULT_THEME_CSS};
use inkpost_engine::{
    finalize_content, Pipeline, RenderOptions, RenderServices, SourceDocument, VaultResolver,
};
use pretty_assertions::assert_eq;

fn pipeline_with(options: RenderOptions) -> (Pipeline, Arc<DiagramQueue>) {
    let diagrams = Arc::new(DiagramQueue::new());
    let services = RenderServices::new(diagrams.clone(), Arc::new(VaultResolver::new(None)));
    (Pipeline::new(services, options), diagrams)
}

fn doc(text: &str) -> SourceDocument {
    SourceDocument::from_text(text, Some(Path::new("notes/Sample.md")))
}

#[tokio::test]
async fn repeated_expression_is_rendered_once() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline
        .render(&doc("Area $x^2$ and again $x^2$.\n"))
        .await;

    assert!(article.html.contains(r#"id="math-id-1""#), "{}", article.html);
    assert!(article.html.contains(r#"id="math-id-2""#));

    let stats = pipeline.services().expressions.stats();
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);

    let cached = pipeline.services().expressions.get("x^2").unwrap();
    assert_eq!(article.html.matches(cached.as_str()).count(), 2);
}

#[tokio::test]
async fn expression_cache_survives_documents_until_cleared() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    pipeline.render(&doc("$a+b$\n")).await;
    pipeline.render(&doc("$$a+b$$\n")).await;
    assert_eq!(pipeline.services().expressions.stats().inserts, 1);

    pipeline.services().expressions.clear();
    pipeline.render(&doc("$a+b$\n")).await;
    assert_eq!(pipeline.services().expressions.stats().inserts, 2);
}

#[tokio::test]
async fn diagrams_get_sequential_containers() {
    let (pipeline, diagrams) = pipeline_with(RenderOptions::default());
    let text = "```mermaid\ngraph TD; A-->B\n```\n\ntext\n\n```mermaid\ngraph TD; B-->C\n```\n";
    let article = pipeline.render(&doc(text)).await;

    assert!(article.html.contains(r#"<section id="mermaid-0" class="note-mermaid"></section>"#));
    assert!(article.html.contains(r#"<section id="mermaid-1" class="note-mermaid"></section>"#));

    let jobs = diagrams.drain();
    let ids: Vec<_> = jobs.iter().map(|job| job.container_id.as_str()).collect();
    assert_eq!(ids, vec!["mermaid-0", "mermaid-1"]);
    assert_eq!(jobs[0].source, "graph TD; A-->B\n");

    let again = pipeline.render(&doc(text)).await;
    assert!(again.html.contains(r#"id="mermaid-0""#));
}

#[tokio::test]
async fn cards_render_then_restore_original_fragment() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let card = r#"<mp-common-profile data-id="gh_42" data-nickname="Inkpost" data-signature="Notes"></mp-common-profile>"#;
    let article = pipeline
        .render(&doc(&format!("Intro\n\n```mpcard\n{card}\n```\n")))
        .await;

    assert!(article.html.contains("note-mpcard-wrapper"));
    assert!(article.html.contains(r#"<div class="note-mpcard-nickname">Inkpost</div>"#));

    let services = pipeline.services();
    let restored = finalize_content(&article.html, &services.assets, &services.cards);
    assert!(restored.contains(card), "{restored}");
    assert!(!restored.contains("note-mpcard-wrapper"));
}

#[tokio::test]
async fn card_without_id_renders_inline_error() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline
        .render(&doc("```mpcard\n<mp-common-profile data-nickname=\"x\">\n```\n"))
        .await;
    assert!(article.html.contains(r#"<span class="render-error">card data has no id</span>"#));
    assert!(pipeline.services().cards.is_empty());
}

#[tokio::test]
async fn code_blocks_get_gutter_when_enabled() {
    let (pipeline, _) = pipeline_with(RenderOptions {
        line_numbers: true,
        ..RenderOptions::default()
    });
    let article = pipeline
        .render(&doc("```rust\nfn main() {}\n\nlet x = 1;\n```\n"))
        .await;
    assert!(article.html.contains("<ul><li>1</li><li>2</li><li>3</li></ul>"));
    assert!(article.html.contains(r#"class="hljs language-rust""#));
    assert!(article.html.contains("<code><br></code>"));
}

#[tokio::test]
async fn unknown_language_still_renders() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline
        .render(&doc("```nosuchlang\na < b\n```\n"))
        .await;
    assert!(article.html.contains("language-nosuchlang"));
    assert!(article.html.contains("&lt;"));
}

#[tokio::test]
async fn local_images_register_once_and_missing_ones_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"png").unwrap();
    let note = dir.path().join("Trip.md");

    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let text = "# Trip\n\n![first](a.png)\n\n![[a.png|300x200]]\n\n![gone](missing.png)\n";
    let article = pipeline
        .render(&SourceDocument::from_text(text, Some(note.as_path())))
        .await;

    let assets = pipeline.services().assets.snapshot();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].state(), UploadState::Pending);
    assert!(article.html.contains(r#"width="300" height="200""#), "{}", article.html);
    assert!(article.html.contains("image not found: missing.png"));
    assert_eq!(
        article.html.matches(&format!(r#"src="{}""#, assets[0].res_url)).count(),
        2
    );
}

#[tokio::test]
async fn external_links_keep_their_url_inline_by_default() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline
        .render(&doc("See [the docs](https://example.com/docs) and [top](#top).\n"))
        .await;

    assert!(
        article.html.contains("<a>the docs[https://example.com/docs]</a>"),
        "{}",
        article.html
    );
    assert!(article.html.contains(r##"<a href="#top">top</a>"##));
    assert!(!article.html.contains(r#"class="footnotes""#));
}

#[tokio::test]
async fn footnote_links_are_numbered_and_listed_under_the_article() {
    let (pipeline, _) = pipeline_with(RenderOptions {
        link_style: LinkStyle::Footnote,
        ..RenderOptions::default()
    });
    let text = "Read [one](https://a.example/1), [two](https://b.example/2) and \
                [earlier](https://mp.weixin.qq.com/s/xyz).\n";
    let article = pipeline.render(&doc(text)).await;

    assert!(article.html.contains("<a>one<sup>[1]</sup></a>"), "{}", article.html);
    assert!(article.html.contains("<a>two<sup>[2]</sup></a>"));
    assert!(article
        .html
        .contains(r#"<a href="https://mp.weixin.qq.com/s/xyz">earlier</a>"#));
    assert!(article.html.ends_with(
        r#"<section class="footnotes"><hr><ol><li>https://a.example/1&nbsp;↩</li><li>https://b.example/2&nbsp;↩</li></ol></section></section>"#
    ));
}

#[tokio::test]
async fn theme_css_is_inlined_into_style_attributes() {
    let (pipeline, _) = pipeline_with(RenderOptions {
        theme_css: Some(".inkpost p { color: red } .inkpost h2 { margin: 0 }".into()),
        ..RenderOptions::default()
    });
    let article = pipeline.render(&doc("## Plan\n\nFirst step.\n")).await;

    assert!(article.html.contains(r#"<h2 style="margin: 0">Plan</h2>"#), "{}", article.html);
    assert!(article.html.contains(r#"<p style="color: red">First step.</p>"#));
    assert!(!article.html.contains("<style"));
}

#[tokio::test]
async fn builtin_theme_styles_highlights() {
    let (pipeline, _) = pipeline_with(RenderOptions {
        theme_css: Some(DEFAULT_THEME_CSS.to_string()),
        ..RenderOptions::default()
    });
    let article = pipeline.render(&doc("A ==key== idea.\n")).await;
    assert!(
        article
            .html
            .contains(r#"<span class="note-highlight" style="background-color: #fefcbf">key</span>"#),
        "{}",
        article.html
    );
}

#[tokio::test]
async fn callouts_become_styled_sections() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline
        .render(&doc("> [!warning] Mind the gap\n> Stand back.\n\n> plain quote\n"))
        .await;

    assert!(
        article.html.contains(
            r#"<section class="note-callout note-callout-question"><section class="note-callout-title-wrap"><span class="note-callout-icon">!</span><span class="note-callout-title">Mind the gap</span></section><section class="note-callout-content">"#
        ),
        "{}",
        article.html
    );
    assert!(article.html.contains("<p>Stand back.</p>\n</section></section>"));
    assert!(article.html.contains("<blockquote>\n<p>plain quote</p>\n</blockquote>"));
    assert!(!article.html.contains("[!warning]"));
}

#[tokio::test]
async fn highlights_become_marked_spans() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline.render(&doc("Keep ==this part== in mind.\n")).await;
    assert!(article
        .html
        .contains(r#"<p>Keep <span class="note-highlight">this part</span> in mind.</p>"#));
}

#[tokio::test]
async fn percent_comments_are_dropped_outside_code() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let text = "Visible %%hidden note%% text.\n\n```text\n%%stays%%\n```\n";
    let article = pipeline.render(&doc(text)).await;

    assert!(article.html.contains("<p>Visible  text.</p>"), "{}", article.html);
    assert!(!article.html.contains("hidden note"));
    assert!(article.html.contains("%%stays%%"));
}

#[tokio::test]
async fn markdown_footnotes_are_numbered_in_definition_order() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let text = "Claim[^b] and another[^a] and a stray[^none].\n\n[^b]: First source.\n\n[^a]: Second source.\n";
    let article = pipeline.render(&doc(text)).await;

    assert!(
        article.html.contains(
            r#"Claim<sup id="fnref-1" class="fnref-sup">1</sup> and another<sup id="fnref-2" class="fnref-sup">2</sup>"#
        ),
        "{}",
        article.html
    );
    assert!(article.html.contains("[^none]"));
    assert!(article.html.contains(r#"<li id="fn-b"><p>First source.</p>"#));
    assert!(article.html.contains(r#"<li id="fn-a"><p>Second source.</p>"#));
    assert!(article.html.find(r#"id="fn-b""#) < article.html.find(r#"id="fn-a""#));
}

#[tokio::test]
async fn headings_render_as_plain_elements() {
    let (pipeline, _) = pipeline_with(RenderOptions::default());
    let article = pipeline.render(&doc("# Title\n\n## Section *one*\n")).await;
    assert!(article.html.contains("<h1>Title</h1>"));
    assert!(article.html.contains("<h2>Section <em>one</em></h2>"));
}

#[tokio::test]
async fn figcaption_wraps_images_when_enabled() {
    let text = "![A quiet harbour](https://example.com/harbour.png)\n\n![](https://example.com/bare.png)\n";

    let (plain, _) = pipeline_with(RenderOptions::default());
    let article = plain.render(&doc(text)).await;
    assert!(!article.html.contains("<figure"));

    let (captioned, _) = pipeline_with(RenderOptions {
        figcaption: true,
        ..RenderOptions::default()
    });
    let article = captioned.render(&doc(text)).await;
    assert!(
        article.html.contains(
            r#"<img src="https://example.com/harbour.png" alt="A quiet harbour"><figcaption>A quiet harbour</figcaption></figure>"#
        ),
        "{}",
        article.html
    );
    assert!(article
        .html
        .contains(r#"<img src="https://example.com/bare.png" alt=""></figure>"#));
}
