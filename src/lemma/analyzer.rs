//! Morphological analysis of single words

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use thiserror::Error;

/// One possible reading of a word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordForm {
    /// Form shared by every inflection of the word, used as the index key
    ///
    /// A dictionary analyzer yields the citation form here; the built-in
    /// [`RussianAnalyzer`] yields a stem.
    pub base_form: String,
    /// Grammatical tag string, e.g. `"С"` or `"ПРЕДЛ"`
    pub tags: String,
}

impl WordForm {
    pub fn new(base_form: impl Into<String>, tags: impl Into<String>) -> Self {
        Self {
            base_form: base_form.into(),
            tags: tags.into(),
        }
    }
}

/// Errors raised by a morphological analyzer for a single token
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unsupported word: {0}")]
    UnsupportedWord(String),

    #[error("Analyzer failure for '{word}': {message}")]
    Analyzer { word: String, message: String },
}

/// Produces the readings of a lowercase word
///
/// Implementations must be shareable between the blocking threads that run
/// lemmatization.
pub trait MorphAnalyzer: Send + Sync {
    fn analyze(&self, word: &str) -> Result<Vec<WordForm>, AnalysisError>;
}

// Closed word classes, tagged the way a full morphology dictionary would.
const CONJUNCTIONS: &[&str] = &[
    "и", "а", "но", "или", "либо", "да", "что", "чтобы", "если", "когда", "хотя", "зато",
    "однако", "потому", "поэтому", "будто", "словно", "ибо", "пока", "нежели", "также", "тоже",
    "причем", "притом",
];
const PREPOSITIONS: &[&str] = &[
    "в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "ото", "до", "из", "изо",
    "за", "под", "подо", "над", "надо", "при", "про", "для", "без", "безо", "через", "у", "перед",
    "между", "около", "после", "вокруг", "среди", "сквозь", "ради", "возле", "кроме", "вместо",
];
const PARTICLES: &[&str] = &[
    "не", "ни", "же", "ли", "бы", "б", "вот", "вон", "даже", "лишь", "только", "ведь", "разве",
    "неужели", "пусть", "пускай", "ка", "уж", "именно", "почти",
];
const INTERJECTIONS: &[&str] = &[
    "ах", "ох", "ой", "эх", "ух", "ай", "увы", "ура", "эй", "ого", "ага", "ну", "тьфу", "браво",
    "ау", "алло",
];

const VERB_ENDINGS: &[&str] = &["ться", "тся", "ть", "ти", "чь"];
const ADJECTIVE_ENDINGS: &[&str] = &[
    "ого", "его", "ому", "ему", "ый", "ий", "ой", "ая", "яя", "ое", "ее", "ые", "ие", "ым", "им",
    "ую", "юю", "ых", "их",
];

/// Built-in Russian analyzer
///
/// Function words are resolved from a small closed-class dictionary. Every
/// other word is reduced with the Snowball Russian stemmer and given a coarse
/// part of speech guessed from its ending: `Г` (verb), `П` (adjective) or
/// `С` (noun and everything else).
///
/// Stems are not dictionary words ("кошка" becomes "кошк"), so the index
/// groups inflections under a stem key. A dictionary-backed analyzer can be
/// plugged in through [`Lemmatizer::with_analyzer`] to key by citation form.
///
/// [`Lemmatizer::with_analyzer`]: crate::lemma::Lemmatizer::with_analyzer
pub struct RussianAnalyzer {
    stemmer: Stemmer,
    closed_class: HashMap<&'static str, &'static str>,
}

impl RussianAnalyzer {
    pub fn new() -> Self {
        let mut closed_class = HashMap::new();
        for (words, tag) in [
            (CONJUNCTIONS, "СОЮЗ"),
            (PREPOSITIONS, "ПРЕДЛ"),
            (PARTICLES, "ЧАСТ"),
            (INTERJECTIONS, "МЕЖД"),
        ] {
            for word in words {
                closed_class.insert(*word, tag);
            }
        }

        Self {
            stemmer: Stemmer::create(Algorithm::Russian),
            closed_class,
        }
    }

    fn guess_part_of_speech(word: &str) -> &'static str {
        let chars = word.chars().count();
        if chars > 3 && VERB_ENDINGS.iter().any(|e| word.ends_with(e)) {
            "Г"
        } else if chars > 3 && ADJECTIVE_ENDINGS.iter().any(|e| word.ends_with(e)) {
            "П"
        } else {
            "С"
        }
    }
}

impl Default for RussianAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cyrillic_word(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| matches!(c, 'а'..='я' | 'ё'))
}

impl MorphAnalyzer for RussianAnalyzer {
    fn analyze(&self, word: &str) -> Result<Vec<WordForm>, AnalysisError> {
        if !is_cyrillic_word(word) {
            return Err(AnalysisError::UnsupportedWord(word.to_string()));
        }

        if let Some(tag) = self.closed_class.get(word) {
            return Ok(vec![WordForm::new(word, *tag)]);
        }

        let stem = self.stemmer.stem(word);
        Ok(vec![WordForm::new(
            stem.into_owned(),
            Self::guess_part_of_speech(word),
        )])
    }
}
