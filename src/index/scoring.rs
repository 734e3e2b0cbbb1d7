//! TF-IDF ranking of documents against a label
//!
//! A label is a set of lemmas. `idf = total documents / sum of the label
//! lemmas' document frequencies`; a document's term frequency is the share of
//! its lemmas that belong to the label.

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use super::document::{Document, DocumentId};
use super::store::{DocumentQuery, SearchStore};
use crate::linguistics::LemmaId;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub id: DocumentId,
    pub score: f64,
}

/// Score and sort documents, highest first, ties by id ascending.
/// Empty when no label lemma occurs in any document.
pub fn score_documents<'a>(
    label: &[LemmaId],
    documents: impl IntoIterator<Item = &'a Document>,
    document_frequencies: &HashMap<LemmaId, u64>,
    total_documents: u64,
) -> Vec<ScoredDocument> {
    let label: HashSet<&str> = label.iter().map(String::as_str).collect();
    let df_sum: u64 = label
        .iter()
        .map(|l| document_frequencies.get(*l).copied().unwrap_or(0))
        .sum();
    if df_sum == 0 {
        return Vec::new();
    }
    let idf = total_documents as f64 / df_sum as f64;

    let mut scored: Vec<ScoredDocument> = documents
        .into_iter()
        .map(|doc| {
            let (total, matching) = doc.lemmas().fold((0usize, 0usize), |(total, matching), lemma| {
                (total + 1, matching + usize::from(label.contains(lemma)))
            });
            let tf = if total == 0 {
                0.0
            } else {
                matching as f64 / total as f64
            };
            ScoredDocument {
                id: doc.id.clone(),
                score: tf * idf,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored
}

/// Rank the documents matching `filters` and containing a label lemma
pub fn rank_by_label(
    store: &dyn SearchStore,
    label: &[LemmaId],
    filters: &DocumentQuery,
) -> Result<Vec<ScoredDocument>> {
    let query = DocumentQuery {
        lemmas: label.to_vec(),
        limit: None,
        ..filters.clone()
    };
    let hits = store.search(&query)?;
    let frequencies = store.document_frequencies(label)?;
    let total = store.document_count()?;

    let mut ranked = score_documents(label, hits.iter().map(|h| &h.document), &frequencies, total);
    if let Some(limit) = filters.limit {
        ranked.truncate(limit);
    }
    Ok(ranked)
}
