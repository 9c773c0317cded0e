//! Cached, parallel lemma extraction

use crate::config::LemmatizerConfig;
use crate::lemma::{AnalysisError, MorphAnalyzer, RussianAnalyzer};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns free text into lemma occurrence counts
///
/// The lemmatizer is cheap to share behind an `Arc`; its token cache is
/// append-only and never evicted.
pub struct Lemmatizer {
    analyzer: Arc<dyn MorphAnalyzer>,
    excluded_tags: Vec<String>,
    cache: DashMap<String, Arc<Vec<String>>>,
}

impl Lemmatizer {
    /// Creates a lemmatizer backed by the built-in Russian analyzer
    pub fn new(config: &LemmatizerConfig) -> Self {
        Self::with_analyzer(
            Arc::new(RussianAnalyzer::new()),
            config.excluded_tags.clone(),
        )
    }

    pub fn with_analyzer(analyzer: Arc<dyn MorphAnalyzer>, excluded_tags: Vec<String>) -> Self {
        Self {
            analyzer,
            excluded_tags,
            cache: DashMap::new(),
        }
    }

    /// Counts the lemmas occurring in `text`
    ///
    /// Blank text yields an empty map. A token the analyzer cannot handle is
    /// logged and skipped.
    pub fn extract_lemmas(&self, text: &str) -> HashMap<String, u32> {
        if text.trim().is_empty() {
            debug!("Skipping lemmatization of blank text");
            return HashMap::new();
        }

        let normalized = normalize(text);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let resolved: Vec<Arc<Vec<String>>> = tokens
            .par_iter()
            .filter_map(|token| match self.base_forms(token) {
                Ok(forms) => Some(forms),
                Err(e) => {
                    warn!("Failed to analyze token '{}': {}", token, e);
                    None
                }
            })
            .collect();

        let mut counts = HashMap::new();
        for forms in &resolved {
            for form in forms.iter() {
                *counts.entry(form.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Like [`extract_lemmas`](Self::extract_lemmas), treating `None` as blank
    pub fn extract_lemmas_opt(&self, text: Option<&str>) -> HashMap<String, u32> {
        match text {
            Some(text) => self.extract_lemmas(text),
            None => HashMap::new(),
        }
    }

    /// Distinct index keys of one normalized token, empty if it is excluded
    pub fn base_forms(&self, token: &str) -> Result<Arc<Vec<String>>, AnalysisError> {
        if let Some(cached) = self.cache.get(token) {
            return Ok(Arc::clone(cached.value()));
        }

        let analyses = self.analyzer.analyze(token)?;

        let forms = if self.is_excluded(&analyses) {
            Vec::new()
        } else {
            let mut forms: Vec<String> = Vec::with_capacity(analyses.len());
            for analysis in analyses {
                if !forms.contains(&analysis.base_form) {
                    forms.push(analysis.base_form);
                }
            }
            forms
        };

        // Another thread may have resolved the same token meanwhile
        let entry = self
            .cache
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(forms));
        Ok(Arc::clone(entry.value()))
    }

    /// Number of cached tokens
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn is_excluded(&self, analyses: &[crate::lemma::WordForm]) -> bool {
        analyses.iter().any(|analysis| {
            self.excluded_tags
                .iter()
                .any(|tag| analysis.tags.contains(tag.as_str()))
        })
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if matches!(c, 'а'..='я' | 'ё') || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}
