//! Lemma disambiguation with bigram statistics
//!
//! Each token of a normalized text is mapped to one lemma. Tokens the corpus
//! does not know are dropped. Tokens with several readings pick the reading
//! that best explains their immediate neighbours:
//!
//! ```text
//! P(ends-in)     = count(prev -> token as candidate) / count(prev -> token)
//! P(starts-with) = count(token as candidate -> next) / count(token -> next)
//! score          = P(ends-in) * P(starts-with)
//! ```
//!
//! A side without a neighbour or without bigram data contributes `1`.

use std::collections::HashMap;

use super::corpus::{Corpus, CorpusError, LemmaId, Word, WordBigramCount};
use super::normalize::words;
use crate::types::LanguageCode;

/// Lemmatize a normalized text into lemma ids, in token order
pub fn lemmatize(
    corpus: &dyn Corpus,
    language: LanguageCode,
    normalized: &str,
) -> Result<Vec<LemmaId>, CorpusError> {
    let tokens: Vec<&str> = words(normalized).collect();

    let mut readings: HashMap<&str, Vec<Word>> = HashMap::new();
    for token in &tokens {
        if !readings.contains_key(token) {
            readings.insert(*token, corpus.words(language, token)?);
        }
    }

    let mut lemmas = Vec::with_capacity(tokens.len());
    for (idx, token) in tokens.iter().enumerate() {
        let candidates = readings.get(token).map(Vec::as_slice).unwrap_or_default();
        match candidates {
            [] => {}
            [only] => lemmas.push(only.lemma_id.clone()),
            _ => {
                let prev = idx.checked_sub(1).map(|i| tokens[i]);
                let next = tokens.get(idx + 1).copied();
                let ending = match prev {
                    Some(prev) => corpus.bigram_counts(language, prev, token)?,
                    None => Vec::new(),
                };
                let starting = match next {
                    Some(next) => corpus.bigram_counts(language, token, next)?,
                    None => Vec::new(),
                };
                let best = pick_best(candidates, &ending, &starting);
                lemmas.push(best.lemma_id.clone());
            }
        }
    }
    Ok(lemmas)
}

/// Space-joined lemma ids of a normalized text
pub fn lemmatize_text(
    corpus: &dyn Corpus,
    language: LanguageCode,
    normalized: &str,
) -> Result<String, CorpusError> {
    Ok(lemmatize(corpus, language, normalized)?.join(" "))
}

/// Highest scoring candidate; the first one wins ties
fn pick_best<'a>(
    candidates: &'a [Word],
    ending_in_token: &[WordBigramCount],
    starting_with_token: &[WordBigramCount],
) -> &'a Word {
    let mut best = &candidates[0];
    let mut best_score = f64::MIN;
    for candidate in candidates {
        let p_end = bigram_probability(ending_in_token, |b| b.second_lemma_id == candidate.lemma_id);
        let p_start = bigram_probability(starting_with_token, |b| b.first_lemma_id == candidate.lemma_id);
        let score = p_end * p_start;
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

fn bigram_probability(counts: &[WordBigramCount], is_candidate: impl Fn(&WordBigramCount) -> bool) -> f64 {
    let total: u64 = counts.iter().map(|b| b.count).sum();
    if total == 0 {
        return 1.0;
    }
    let matching: u64 = counts.iter().filter(|b| is_candidate(*b)).map(|b| b.count).sum();
    matching as f64 / total as f64
}
