//! Spanish text processing
//!
//! The pipeline runs these in order on extracted page text:
//! [`normalize`] to sentence-per-line lower-case text, [`lemmatize`] against a
//! [`Corpus`], and [`readability_score`] on the normalized text.

pub mod corpus;
pub mod disambiguate;
pub mod normalize;
pub mod readability;
pub mod syllables;

pub use corpus::{Corpus, CorpusError, InMemoryCorpus, LemmaId, Word, WordBigramCount};
pub use disambiguate::{lemmatize, lemmatize_text};
pub use normalize::normalize;
pub use readability::{readability_score, rounded_score, ReadabilityError, TextStats};
pub use syllables::count_syllables;
