use std::sync::Arc;

use regex::Regex;

use super::{error_span, fence_lang, Extension, RenderContext, RenderToken, SourceBlock, TokenKind};
use crate::cache::CardStore;

const CARD_KIND: &str = "mpcard";
const DEFAULT_NICKNAME: &str = "公众号名称";
const DEFAULT_SIGNATURE: &str = "公众号介绍";
const CARD_FOOT: &str = "公众号";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub id: String,
    pub headimg: String,
    pub nickname: String,
    pub signature: String,
}

/// Pulls the card attributes out of an authored profile fragment.
pub fn parse_card(fragment: &str) -> CardFields {
    CardFields {
        id: attribute(fragment, "data-id").unwrap_or_default(),
        headimg: attribute(fragment, "data-headimg").unwrap_or_default(),
        nickname: attribute(fragment, "data-nickname")
            .unwrap_or_else(|| DEFAULT_NICKNAME.to_string()),
        signature: attribute(fragment, "data-signature")
            .unwrap_or_else(|| DEFAULT_SIGNATURE.to_string()),
    }
}

fn attribute(fragment: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(r#"{}="([^"]+)""#, regex::escape(name))).ok()?;
    re.captures(fragment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Renders `mpcard` fences as a profile card and remembers the original
/// fragment by id for [`CardStore::restore`].
pub struct CardExtension {
    store: Arc<CardStore>,
}

impl CardExtension {
    pub fn new(store: Arc<CardStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Extension for CardExtension {
    fn name(&self) -> &'static str {
        "card"
    }

    fn tokenize(&self, block: &SourceBlock) -> Option<RenderToken> {
        let SourceBlock::Fence { info, text } = block else {
            return None;
        };
        (fence_lang(info)?.as_str() == CARD_KIND)
            .then(|| RenderToken::new(TokenKind::Card, text.trim_end_matches('\n')))
    }

    async fn walk(&self, token: &mut RenderToken, _ctx: &mut RenderContext) {
        let fields = parse_card(token.raw());
        if fields.id.is_empty() {
            token.set_rendered(error_span("card data has no id"));
            return;
        }
        self.store.set(&fields.id, token.raw());
        let CardFields {
            id,
            headimg,
            nickname,
            signature,
        } = fields;
        token.set_rendered(format!(
            r#"<section data-id="{id}" class="note-mpcard-wrapper"><div class="note-mpcard-content"><img class="note-mpcard-headimg" width="54" height="54" src="{headimg}"></img><div class="note-mpcard-info"><div class="note-mpcard-nickname">{nickname}</div><div class="note-mpcard-signature">{signature}</div></div></div><div class="note-mpcard-foot">{CARD_FOOT}</div></section>"#
        ));
    }
}
