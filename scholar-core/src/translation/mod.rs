//! On-demand translation of titles and summaries.
//!
//! Translations are cached in memory by source text with a TTL and applied
//! through a shadow map, so the underlying paper and summary data are
//! never modified.

use crate::brain::LlmProvider;
use crate::error::PipelineError;
use crate::language::Language;
use crate::paper::{Paper, PaperId};
use crate::types::CompletionRequest;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default cache entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    translation: String,
    stored_at: Instant,
}

/// In-memory translation cache with lazy expiry.
#[derive(Debug)]
pub struct TranslationCache {
    entries: Mutex<HashMap<(Language, String), CacheEntry>>,
    ttl: Duration,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TranslationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<(Language, String), CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Look up a fresh translation. Expired entries are evicted here.
    pub fn get(&self, text: &str, target: Language) -> Option<String> {
        let key = (target, text.to_string());
        let mut entries = self.entries();
        let entry = entries.get(&key)?;
        if entry.stored_at.elapsed() > self.ttl {
            entries.remove(&key);
            return None;
        }
        Some(entry.translation.clone())
    }

    pub fn insert(&self, text: &str, target: Language, translation: impl Into<String>) {
        self.entries().insert(
            (target, text.to_string()),
            CacheEntry {
                translation: translation.into(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

const TRANSLATION_SYSTEM_PROMPT: &str = "\
You are a professional academic translator. Translate the user's text into {lang}.
- Keep academic terminology precise.
- Preserve the tone and style of the original.
- Make the translation fluent and easy to read.
- For technical terms you may keep the English original in parentheses.
Reply with the translation only.";

/// Cache-first translator.
pub struct Translator {
    provider: Arc<dyn LlmProvider>,
    cache: Arc<TranslationCache>,
    model: Option<String>,
}

impl Translator {
    pub fn new(provider: Arc<dyn LlmProvider>, cache: Arc<TranslationCache>) -> Self {
        Self {
            provider,
            cache,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Translate `text` into `target`. A cache hit makes no model call.
    pub async fn translate(&self, text: &str, target: Language) -> Result<String, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::TranslationFailed {
                reason: "no text to translate".to_string(),
            });
        }
        if let Some(hit) = self.cache.get(text, target) {
            debug!(target = %target, "Translation cache hit");
            return Ok(hit);
        }

        let request = CompletionRequest {
            temperature: 0.3,
            max_tokens: Some(1000),
            model: self.model.clone(),
            ..CompletionRequest::with_system(
                TRANSLATION_SYSTEM_PROMPT.replace("{lang}", target.prompt_name()),
                text,
            )
        };
        let response = self.provider.complete(request).await.map_err(|e| {
            PipelineError::TranslationFailed {
                reason: e.to_string(),
            }
        })?;

        let translation = response.text.trim().to_string();
        if translation.is_empty() {
            return Err(PipelineError::TranslationFailed {
                reason: "model returned an empty translation".to_string(),
            });
        }
        self.cache.insert(text, target, translation.clone());
        Ok(translation)
    }
}

/// Shadow map of translated display strings keyed `title-{id}` / `abstract-{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationOverlay {
    shadow: HashMap<String, String>,
    enabled: bool,
}

impl TranslationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title_key(id: &str) -> String {
        format!("title-{}", id)
    }

    pub fn abstract_key(id: &str) -> String {
        format!("abstract-{}", id)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flip between translated and original display. Shadow entries are kept.
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn insert(&mut self, key: String, translation: String) {
        self.shadow.insert(key, translation);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.shadow.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.shadow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadow.is_empty()
    }

    /// Title to display for `paper`.
    pub fn title<'a>(&'a self, paper: &'a Paper) -> &'a str {
        self.display(&Self::title_key(&paper.id), &paper.title)
    }

    /// Summary text to display for paper `id`.
    pub fn summary<'a>(&'a self, id: &str, original: &'a str) -> &'a str {
        self.display(&Self::abstract_key(id), original)
    }

    fn display<'a>(&'a self, key: &str, original: &'a str) -> &'a str {
        if self.enabled {
            self.shadow.get(key).map(String::as_str).unwrap_or(original)
        } else {
            original
        }
    }

    /// Fill missing shadow entries for the given papers and their summaries.
    ///
    /// Failures are logged and leave the original text in place. Returns the
    /// number of entries added.
    pub async fn populate(
        &mut self,
        translator: &Translator,
        target: Language,
        papers: &[Paper],
        summaries: &HashMap<PaperId, String>,
    ) -> usize {
        let mut added = 0;
        for paper in papers {
            let mut jobs = vec![(Self::title_key(&paper.id), paper.title.as_str())];
            if let Some(summary) = summaries.get(&paper.id) {
                jobs.push((Self::abstract_key(&paper.id), summary.as_str()));
            }
            for (key, text) in jobs {
                if self.shadow.contains_key(&key) || text.trim().is_empty() {
                    continue;
                }
                match translator.translate(text, target).await {
                    Ok(translation) => {
                        self.shadow.insert(key, translation);
                        added += 1;
                    }
                    Err(e) => warn!(key = %key, error = %e, "Translation failed; keeping original"),
                }
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let cache = TranslationCache::new(Duration::from_secs(60));
        cache.insert("sleep", Language::Zh, "睡眠");
        assert_eq!(cache.get("sleep", Language::Zh).as_deref(), Some("睡眠"));
        assert!(cache.get("sleep", Language::En).is_none());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("sleep", Language::Zh).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TranslationCache::new(Duration::from_secs(10));
        cache.insert("a", Language::Zh, "甲");
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("b", Language::Zh, "乙");
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_translator_cache_short_circuits() {
        let mock = Arc::new(MockLlmProvider::with_response("咖啡因与睡眠"));
        let translator = Translator::new(mock.clone(), Arc::new(TranslationCache::default()));

        let first = translator.translate("Caffeine and sleep", Language::Zh).await.unwrap();
        let second = translator.translate("Caffeine and sleep", Language::Zh).await.unwrap();
        assert_eq!(first, "咖啡因与睡眠");
        assert_eq!(second, first);
        assert_eq!(mock.request_count(), 1);
        assert!(mock.requests()[0].messages[0].content.contains("Chinese"));
    }

    #[tokio::test]
    async fn test_translator_rejects_empty_text() {
        let mock = Arc::new(MockLlmProvider::with_response("x"));
        let translator = Translator::new(mock.clone(), Arc::new(TranslationCache::default()));
        assert!(translator.translate("  ", Language::Zh).await.is_err());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_overlay_populate_and_toggle() {
        let mock = Arc::new(MockLlmProvider::with_response("译文"));
        mock.fail_when_prompt_contains("Broken title");
        let translator = Translator::new(mock, Arc::new(TranslationCache::default()));

        let papers = vec![
            Paper::new("p1", "Caffeine and sleep"),
            Paper::new("p2", "Broken title"),
        ];
        let mut summaries = HashMap::new();
        summaries.insert("p1".to_string(), "Caffeine delays sleep.".to_string());

        let mut overlay = TranslationOverlay::new();
        let added = overlay
            .populate(&translator, Language::Zh, &papers, &summaries)
            .await;
        assert_eq!(added, 2);
        assert_eq!(overlay.get("title-p1"), Some("译文"));
        assert_eq!(overlay.get("abstract-p1"), Some("译文"));
        assert!(overlay.get("title-p2").is_none());

        // Disabled overlay shows originals.
        assert_eq!(overlay.title(&papers[0]), "Caffeine and sleep");

        overlay.toggle();
        assert_eq!(overlay.title(&papers[0]), "译文");
        assert_eq!(overlay.summary("p1", "Caffeine delays sleep."), "译文");
        // Failed translation keeps the original.
        assert_eq!(overlay.title(&papers[1]), "Broken title");

        overlay.toggle();
        assert_eq!(overlay.title(&papers[0]), "Caffeine and sleep");
        assert_eq!(papers[0].title, "Caffeine and sleep");
    }
}
