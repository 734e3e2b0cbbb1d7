//! Lemma corpus: word forms and bigram counts

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::types::LanguageCode;

pub type LemmaId = String;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}:{line}: {detail}")]
    Malformed {
        file: String,
        line: usize,
        detail: String,
    },
    #[error("corpus lookup failed: {0}")]
    Lookup(String),
}

/// One surface form of a lemma
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub language: LanguageCode,
    pub lemma_id: LemmaId,
    pub part_of_speech_id: String,
}

/// How often `first` was followed by `second`, per lemma reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordBigramCount {
    pub first_text: String,
    pub first_lemma_id: LemmaId,
    pub second_text: String,
    pub second_lemma_id: LemmaId,
    pub count: u64,
}

/// Read access to a lemma corpus
pub trait Corpus: Send + Sync {
    /// Every reading of a surface form, in corpus order
    fn words(&self, language: LanguageCode, text: &str) -> Result<Vec<Word>, CorpusError>;

    /// Bigram counts for the text pair `first second`
    fn bigram_counts(
        &self,
        language: LanguageCode,
        first: &str,
        second: &str,
    ) -> Result<Vec<WordBigramCount>, CorpusError>;
}

/// Corpus held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    words: HashMap<(LanguageCode, String), Vec<Word>>,
    bigrams: HashMap<(String, String), Vec<WordBigramCount>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_word(&mut self, word: Word) {
        self.words
            .entry((word.language, word.text.clone()))
            .or_default()
            .push(word);
    }

    pub fn add_bigram(&mut self, bigram: WordBigramCount) {
        self.bigrams
            .entry((bigram.first_text.clone(), bigram.second_text.clone()))
            .or_default()
            .push(bigram);
    }

    pub fn word_count(&self) -> usize {
        self.words.values().map(Vec::len).sum()
    }

    pub fn bigram_count(&self) -> usize {
        self.bigrams.values().map(Vec::len).sum()
    }

    /// Load `words.tsv` and `bigrams.tsv` from a directory.
    /// A missing `bigrams.tsv` yields a corpus without bigram data.
    pub fn load(dir: &Path) -> Result<Self, CorpusError> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| CorpusError::Io { path, source })
        };
        let words = read("words.tsv")?;
        let bigrams = match read("bigrams.tsv") {
            Ok(content) => content,
            Err(CorpusError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                String::new()
            }
            Err(e) => return Err(e),
        };
        let corpus = Self::from_tsv(&words, &bigrams)?;
        info!(
            dir = %dir.display(),
            words = corpus.word_count(),
            bigrams = corpus.bigram_count(),
            "Loaded corpus"
        );
        Ok(corpus)
    }

    /// Parse the two TSV tables. Blank lines and `#` comments are skipped.
    pub fn from_tsv(words: &str, bigrams: &str) -> Result<Self, CorpusError> {
        let mut corpus = Self::new();

        for (line_no, fields) in tsv_rows(words) {
            let malformed = |detail: String| CorpusError::Malformed {
                file: "words.tsv".to_string(),
                line: line_no,
                detail,
            };
            let [text, language, lemma_id, pos_id] = fields.as_slice() else {
                return Err(malformed(format!("expected 4 columns, found {}", fields.len())));
            };
            let language: LanguageCode = language.parse().map_err(malformed)?;
            corpus.add_word(Word {
                text: text.to_string(),
                language,
                lemma_id: lemma_id.to_string(),
                part_of_speech_id: pos_id.to_string(),
            });
        }

        for (line_no, fields) in tsv_rows(bigrams) {
            let malformed = |detail: String| CorpusError::Malformed {
                file: "bigrams.tsv".to_string(),
                line: line_no,
                detail,
            };
            let [first_text, first_lemma, second_text, second_lemma, count] = fields.as_slice() else {
                return Err(malformed(format!("expected 5 columns, found {}", fields.len())));
            };
            let count: u64 = count
                .parse()
                .map_err(|_| malformed(format!("invalid count '{}'", count)))?;
            corpus.add_bigram(WordBigramCount {
                first_text: first_text.to_string(),
                first_lemma_id: first_lemma.to_string(),
                second_text: second_text.to_string(),
                second_lemma_id: second_lemma.to_string(),
                count,
            });
        }

        Ok(corpus)
    }
}

fn tsv_rows(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| (idx + 1, line.split('\t').map(str::trim).collect()))
}

impl Corpus for InMemoryCorpus {
    fn words(&self, language: LanguageCode, text: &str) -> Result<Vec<Word>, CorpusError> {
        Ok(self
            .words
            .get(&(language, text.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    // bigrams.tsv carries no language column
    fn bigram_counts(
        &self,
        _language: LanguageCode,
        first: &str,
        second: &str,
    ) -> Result<Vec<WordBigramCount>, CorpusError> {
        Ok(self
            .bigrams
            .get(&(first.to_string(), second.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
