use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use inkpost_logging::ink_warn;
use regex::{NoExpand, Regex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub inserts: usize,
}

/// Rendered math keyed by the literal expression text.
///
/// Lives for the whole process and is shared by every render pass; entries
/// only disappear through [`ExpressionCache::clear`].
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, String>>,
    hits: AtomicUsize,
    inserts: AtomicUsize,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, expression: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(expression).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Stores a rendered fragment. The first value stored for a key wins.
    pub fn set(&self, expression: &str, rendered: String) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(expression) {
            entries.insert(expression.to_string(), rendered);
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            hits: self.hits.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
        }
    }
}

/// Original card fragments keyed by card id, used to splice the authored
/// block back over the generated wrapper.
#[derive(Debug, Default)]
pub struct CardStore {
    cards: Mutex<HashMap<String, String>>,
}

impl CardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.cards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn set(&self, id: &str, original: &str) {
        self.cards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), original.to_string());
    }

    pub fn clear(&self) {
        self.cards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.cards.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces every `<section ... data-id="{id}" ...>...</section>` in `html`
    /// with the stored original for that id. Unknown ids are left untouched.
    pub fn restore(&self, html: &str) -> String {
        let cards = self.cards.lock().unwrap_or_else(PoisonError::into_inner);
        let mut output = html.to_string();
        for (id, original) in cards.iter() {
            let pattern = format!(
                r#"(?s)<section[^>]*\sdata-id="{}"[^>]*>(.*?)</section>"#,
                regex::escape(id)
            );
            let Ok(re) = Regex::new(&pattern) else {
                ink_warn!("Skipping card {id}: pattern did not compile");
                continue;
            };
            output = re.replace_all(&output, NoExpand(original)).into_owned();
        }
        output
    }
}
