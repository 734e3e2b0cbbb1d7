use anyhow::Result;
use noticiero::{
    config::Config,
    index::{rank_by_label, DocumentQuery, SearchStore, SledSearchStore},
    linguistics::{lemmatize_text, normalize, rounded_score, TextStats},
    types::LanguageCode,
};

use super::{load_corpus, open_store};

pub async fn readability(text: String) -> Result<()> {
    let normalized = normalize(&text);
    let stats = TextStats::from_normalized(&normalized)?;
    let score = stats.score()?;
    println!(
        "{} ({:.2}; {} sentences, {} words, {} syllables)",
        rounded_score(score),
        score,
        stats.sentences,
        stats.words,
        stats.syllables
    );
    Ok(())
}

pub async fn lemmatize(config: Config, text: String, language: LanguageCode) -> Result<()> {
    let corpus = load_corpus(&config)?;
    println!("{}", lemmatize_text(&corpus, language, &normalize(&text))?);
    Ok(())
}

pub struct ScoreOptions {
    pub lemmas: Vec<String>,
    pub domains: Vec<String>,
    pub min_readability: Option<i64>,
    pub max_readability: Option<i64>,
    pub limit: usize,
    pub format: String,
}

/// Rank stored documents against a label
pub async fn score_label(config: Config, opts: ScoreOptions) -> Result<()> {
    let store = open_store(&config)?;
    let search = SledSearchStore::open(store.db())?;
    let query = DocumentQuery {
        language: Some(LanguageCode::Spanish),
        domains: (!opts.domains.is_empty()).then(|| opts.domains.clone()),
        min_readability: opts.min_readability,
        max_readability: opts.max_readability,
        limit: Some(opts.limit),
        ..DocumentQuery::default()
    };
    let ranked = rank_by_label(&search, &opts.lemmas, &query)?;

    if opts.format == "json" {
        let rows: Vec<serde_json::Value> = ranked
            .iter()
            .map(|scored| -> Result<serde_json::Value> {
                let url = search.get_document(&scored.id)?.map(|d| d.url);
                Ok(serde_json::json!({
                    "id": scored.id.as_str(),
                    "score": scored.score,
                    "url": url,
                }))
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if ranked.is_empty() {
        println!("No documents match {}", opts.lemmas.join(" "));
        return Ok(());
    }
    for (rank, scored) in ranked.iter().enumerate() {
        let Some(doc) = search.get_document(&scored.id)? else {
            continue;
        };
        println!("{:>3}. {:.4}  {}", rank + 1, scored.score, doc.url);
        if let Some(title) = doc.metadata.title.as_deref() {
            println!("      {}", title);
        }
    }
    Ok(())
}
