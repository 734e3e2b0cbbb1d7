//! Flesch-style readability for Spanish text
//!
//! `206.84 - 60 * syllables / words - 1.02 * sentences / words`

use thiserror::Error;

use super::normalize::sentences;
use super::syllables::count_syllables;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadabilityError {
    #[error("unsupported character {character:?} in word '{word}'")]
    UnsupportedCharacter { character: char, word: String },
    #[error("text has no words")]
    EmptyText,
}

/// Counts behind a readability score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    pub sentences: u32,
    pub words: u32,
    pub syllables: u32,
}

impl TextStats {
    /// Count sentences, words and syllables of a normalized text
    pub fn from_normalized(normalized: &str) -> Result<Self, ReadabilityError> {
        let mut stats = TextStats::default();
        for sentence in sentences(normalized) {
            stats.sentences += 1;
            for word in sentence.split_whitespace() {
                stats.words += 1;
                stats.syllables += count_syllables(word)?;
            }
        }
        Ok(stats)
    }

    pub fn score(&self) -> Result<f64, ReadabilityError> {
        if self.words == 0 {
            return Err(ReadabilityError::EmptyText);
        }
        let words = f64::from(self.words);
        Ok(206.84 - 60.0 * (f64::from(self.syllables) / words) - 1.02 * (f64::from(self.sentences) / words))
    }
}

/// Readability of a normalized text
pub fn readability_score(normalized: &str) -> Result<f64, ReadabilityError> {
    TextStats::from_normalized(normalized)?.score()
}

/// Score as stored on documents
pub fn rounded_score(score: f64) -> i64 {
    score.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn formula_matches_reference_values() {
        let stats = TextStats {
            sentences: 1,
            words: 2,
            syllables: 4,
        };
        assert_close(stats.score().unwrap(), 86.33);
    }

    #[test]
    fn counts_normalized_text() {
        let stats = TextStats::from_normalized("casa perro\nhola").unwrap();
        assert_eq!(
            stats,
            TextStats {
                sentences: 2,
                words: 3,
                syllables: 6
            }
        );
        assert_close(readability_score("casa perro").unwrap(), 86.33);
    }

    #[test]
    fn empty_text_is_an_error() {
        assert_eq!(readability_score(""), Err(ReadabilityError::EmptyText));
        assert_eq!(readability_score("\n\n"), Err(ReadabilityError::EmptyText));
    }

    #[test]
    fn unsupported_character_fails_whole_text() {
        let err = readability_score("casa perro\nhola 42").unwrap_err();
        assert_eq!(
            err,
            ReadabilityError::UnsupportedCharacter {
                character: '4',
                word: "42".to_string()
            }
        );
    }

    #[test]
    fn rounding() {
        assert_eq!(rounded_score(86.33), 86);
        assert_eq!(rounded_score(86.5), 87);
        assert_eq!(rounded_score(-3.6), -4);
    }
}
