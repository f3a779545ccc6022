//! Two-tier tokenization for the lexical index
//!
//! The preferred tier is a language-aware tantivy analyzer (stop words and
//! stemming). When no analyzer exists for the configured language the index
//! uses a plain regex word splitter instead. The choice is made once per
//! index build and the same tokenizer serves both corpus and queries.

use regex::Regex;
use std::sync::OnceLock;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};
use tracing::{info, warn};

use crate::config::{LexicalConfig, TokenizerKind};

static RE_WORD: OnceLock<Regex> = OnceLock::new();

/// Tokens longer than this are dropped by the preferred analyzer
const MAX_TOKEN_BYTES: usize = 64;

/// Splits text into normalized terms
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;

    fn name(&self) -> &'static str;
}

/// Language-aware analyzer: simple tokenizer, lowercasing, stop words, stemming
#[derive(Clone)]
pub struct PreferredTokenizer {
    analyzer: TextAnalyzer,
    language: Language,
}

impl PreferredTokenizer {
    /// Build the analyzer for `language`.
    ///
    /// Returns `None` when tantivy has no stop-word list for the language.
    pub fn new(language: &str) -> Option<Self> {
        let language = parse_language(language)?;
        let stop_words = StopWordFilter::new(language)?;
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
            .filter(LowerCaser)
            .filter(stop_words)
            .filter(Stemmer::new(language))
            .build();
        Some(Self { analyzer, language })
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

impl Tokenizer for PreferredTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        // token_stream needs &mut, so each call works on its own analyzer
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "preferred"
    }
}

/// Lowercase, strip punctuation, keep runs of word characters
#[derive(Debug, Clone, Default)]
pub struct FallbackRegexTokenizer;

impl Tokenizer for FallbackRegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let re = RE_WORD.get_or_init(|| Regex::new(r"\w+").unwrap());
        let lowered = text.to_lowercase();
        re.find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// The tokenizer chosen for one index build
#[derive(Clone)]
pub enum TokenizerStrategy {
    Preferred(PreferredTokenizer),
    Fallback(FallbackRegexTokenizer),
}

impl TokenizerStrategy {
    /// Pick the tokenizer for an index build and log the choice.
    ///
    /// Never fails: an unavailable analyzer degrades to the regex tokenizer.
    pub fn select(config: &LexicalConfig) -> Self {
        match config.tokenizer {
            TokenizerKind::Regex => {
                info!("Lexical tokenizer: regex (configured)");
                Self::Fallback(FallbackRegexTokenizer)
            }
            TokenizerKind::Preferred => match PreferredTokenizer::new(&config.language) {
                Some(preferred) => {
                    info!(
                        "Lexical tokenizer: preferred (language={:?})",
                        preferred.language()
                    );
                    Self::Preferred(preferred)
                }
                None => {
                    warn!(
                        "No stop-word analyzer for language '{}', using regex tokenizer",
                        config.language
                    );
                    Self::Fallback(FallbackRegexTokenizer)
                }
            },
        }
    }
}

impl Tokenizer for TokenizerStrategy {
    fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Self::Preferred(t) => t.tokenize(text),
            Self::Fallback(t) => t.tokenize(text),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Preferred(t) => t.name(),
            Self::Fallback(t) => t.name(),
        }
    }
}

fn parse_language(name: &str) -> Option<Language> {
    let lang = match name.trim().to_ascii_lowercase().as_str() {
        "danish" | "da" => Language::Danish,
        "dutch" | "nl" => Language::Dutch,
        "english" | "en" => Language::English,
        "finnish" | "fi" => Language::Finnish,
        "french" | "fr" => Language::French,
        "german" | "de" => Language::German,
        "hungarian" | "hu" => Language::Hungarian,
        "italian" | "it" => Language::Italian,
        "norwegian" | "no" => Language::Norwegian,
        "portuguese" | "pt" => Language::Portuguese,
        "russian" | "ru" => Language::Russian,
        "spanish" | "es" => Language::Spanish,
        "swedish" | "sv" => Language::Swedish,
        _ => return None,
    };
    Some(lang)
}
