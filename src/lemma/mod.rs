//! Lemma extraction
//!
//! Text is normalized to lowercase Cyrillic tokens, each token is reduced to
//! its index keys by a [`MorphAnalyzer`] (stems, with the built-in analyzer),
//! and tokens whose part of speech is
//! excluded (conjunctions, prepositions, particles, interjections) are
//! dropped. The [`Lemmatizer`] caches per-token results for the lifetime of
//! the process.

mod analyzer;
mod html;
mod lemmatizer;

pub use analyzer::{AnalysisError, MorphAnalyzer, RussianAnalyzer, WordForm};
pub use html::strip_html;
pub use lemmatizer::Lemmatizer;
