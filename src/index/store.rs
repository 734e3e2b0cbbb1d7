//! Search store: documents, episodes and lemma document frequencies

use anyhow::{Context, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::document::{Document, DocumentId, PodcastEpisode};
use crate::linguistics::LemmaId;
use crate::storage::StorageError;
use crate::types::LanguageCode;

/// Boolean filters and optional lemma terms for [`SearchStore::search`]
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub language: Option<LanguageCode>,
    /// Only documents from these domains, when set
    pub domains: Option<Vec<String>>,
    pub min_readability: Option<i64>,
    pub max_readability: Option<i64>,
    pub min_version: Option<u32>,
    pub max_version: Option<u32>,
    pub excluded_ids: HashSet<DocumentId>,
    /// When non-empty, documents must contain at least one of these
    pub lemmas: Vec<LemmaId>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    fn accepts(&self, doc: &Document) -> bool {
        if self.language.is_some_and(|l| l != doc.language_code) {
            return false;
        }
        if let Some(ref domains) = self.domains {
            if !domains.iter().any(|d| *d == doc.domain) {
                return false;
            }
        }
        if self.min_readability.is_some_and(|min| doc.readability_score < min)
            || self.max_readability.is_some_and(|max| doc.readability_score > max)
        {
            return false;
        }
        if self.min_version.is_some_and(|min| doc.version < min)
            || self.max_version.is_some_and(|max| doc.version > max)
        {
            return false;
        }
        !self.excluded_ids.contains(&doc.id)
    }
}

/// A search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: Document,
    /// Occurrences of query lemmas in the document
    pub matched_lemmas: usize,
}

/// Where indexed documents live
pub trait SearchStore: Send + Sync {
    /// Insert or overwrite by id
    fn upsert_document(&self, document: &Document) -> Result<()>;

    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Filtered documents ordered by matched lemmas, then recency, then id
    fn search(&self, query: &DocumentQuery) -> Result<Vec<SearchHit>>;

    fn upsert_episode(&self, episode: &PodcastEpisode) -> Result<()>;

    fn get_episode(&self, id: &str) -> Result<Option<PodcastEpisode>>;

    /// Number of documents containing each lemma; absent lemmas map to 0
    fn document_frequencies(&self, lemmas: &[LemmaId]) -> Result<HashMap<LemmaId, u64>>;

    fn document_count(&self) -> Result<u64>;
}

/// [`SearchStore`] over trees of the pipeline's sled database
pub struct SledSearchStore {
    documents: sled::Tree,
    episodes: sled::Tree,
    /// lemma -> number of documents containing it (u64 be)
    lemma_df: sled::Tree,
}

fn distinct_lemmas(doc: &Document) -> BTreeSet<&str> {
    doc.lemmas().collect()
}

fn decode_count(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    if bytes.len() == 8 {
        buf.copy_from_slice(bytes);
    }
    u64::from_be_bytes(buf)
}

fn abort<E: Into<StorageError>>(e: E) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(e.into())
}

impl SledSearchStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        let open = |name: &str| {
            db.open_tree(name)
                .with_context(|| format!("Failed to open {} tree", name))
        };
        Ok(Self {
            documents: open("documents")?,
            episodes: open("episodes")?,
            lemma_df: open("lemma_df")?,
        })
    }

    fn decode_document(bytes: &[u8]) -> Result<Document> {
        bincode::deserialize(bytes).context("Failed to decode stored document")
    }

    /// All stored documents, in id order
    pub fn documents(&self) -> Result<Vec<Document>> {
        self.documents
            .iter()
            .values()
            .map(|v| Self::decode_document(&v?))
            .collect()
    }
}

impl SearchStore for SledSearchStore {
    fn upsert_document(&self, document: &Document) -> Result<()> {
        let encoded = bincode::serialize(document).context("Failed to encode document")?;
        let key = document.id.as_str().as_bytes();
        let new_lemmas = distinct_lemmas(document);

        (&self.documents, &self.lemma_df)
            .transaction(|(docs, df)| {
                let previous: Option<Document> = match docs.insert(key, encoded.clone())? {
                    Some(old) => Some(bincode::deserialize(&old).map_err(abort)?),
                    None => None,
                };
                let old_lemmas: BTreeSet<String> = previous
                    .as_ref()
                    .map(|d| d.lemmas().map(str::to_string).collect())
                    .unwrap_or_default();

                for lemma in old_lemmas.iter().filter(|l| !new_lemmas.contains(l.as_str())) {
                    let count = df.get(lemma.as_bytes())?.map(|v| decode_count(&v)).unwrap_or(0);
                    if count <= 1 {
                        df.remove(lemma.as_bytes())?;
                    } else {
                        df.insert(lemma.as_bytes(), (count - 1).to_be_bytes().to_vec())?;
                    }
                }
                for lemma in new_lemmas.iter().filter(|l| !old_lemmas.contains(**l)) {
                    let count = df.get(lemma.as_bytes())?.map(|v| decode_count(&v)).unwrap_or(0);
                    df.insert(lemma.as_bytes(), (count + 1).to_be_bytes().to_vec())?;
                }
                Ok(previous.is_some())
            })
            .map(|replaced| {
                debug!(id = %document.id, replaced, "Upserted document");
            })
            .map_err(|e: TransactionError<StorageError>| match e {
                TransactionError::Abort(e) => anyhow::Error::from(e),
                TransactionError::Storage(e) => anyhow::Error::from(e),
            })
            .with_context(|| format!("Failed to upsert document {}", document.id))
    }

    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        match self.documents.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_document(&bytes)?)),
            None => Ok(None),
        }
    }

    fn search(&self, query: &DocumentQuery) -> Result<Vec<SearchHit>> {
        let terms: HashSet<&str> = query.lemmas.iter().map(String::as_str).collect();
        let mut hits = Vec::new();
        for value in self.documents.iter().values() {
            let document = Self::decode_document(&value?)?;
            if !query.accepts(&document) {
                continue;
            }
            let matched_lemmas = document.lemmas().filter(|l| terms.contains(l)).count();
            if !terms.is_empty() && matched_lemmas == 0 {
                continue;
            }
            hits.push(SearchHit {
                document,
                matched_lemmas,
            });
        }

        hits.sort_by(|a, b| {
            b.matched_lemmas
                .cmp(&a.matched_lemmas)
                .then_with(|| b.document.recency().cmp(&a.document.recency()))
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    fn upsert_episode(&self, episode: &PodcastEpisode) -> Result<()> {
        let encoded = bincode::serialize(episode).context("Failed to encode episode")?;
        self.episodes
            .insert(episode.id.as_bytes(), encoded)
            .with_context(|| format!("Failed to upsert episode {}", episode.id))?;
        Ok(())
    }

    fn get_episode(&self, id: &str) -> Result<Option<PodcastEpisode>> {
        match self.episodes.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).context("Failed to decode stored episode")?,
            )),
            None => Ok(None),
        }
    }

    fn document_frequencies(&self, lemmas: &[LemmaId]) -> Result<HashMap<LemmaId, u64>> {
        let mut out = HashMap::with_capacity(lemmas.len());
        for lemma in lemmas {
            let count = self
                .lemma_df
                .get(lemma.as_bytes())?
                .map(|v| decode_count(&v))
                .unwrap_or(0);
            out.insert(lemma.clone(), count);
        }
        Ok(out)
    }

    fn document_count(&self) -> Result<u64> {
        Ok(self.documents.len() as u64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::document::{DocumentMetadata, CURRENT_DOCUMENT_VERSION};

    pub(crate) fn doc(url: &str, domain: &str, lemmas: &str, readability: i64, ingested: i64) -> Document {
        Document {
            id: DocumentId::for_url(url).unwrap(),
            url: url.to_string(),
            version: CURRENT_DOCUMENT_VERSION,
            language_code: LanguageCode::Spanish,
            lemmatized_body: lemmas.to_string(),
            readability_score: readability,
            metadata: DocumentMetadata::default(),
            has_paywall: false,
            source_id: None,
            domain: domain.to_string(),
            page_type: Some("article".to_string()),
            seed_job_ingest_timestamp: Some(ingested),
        }
    }

    fn store() -> SledSearchStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledSearchStore::open(&db).unwrap()
    }

    fn ids(hits: &[SearchHit]) -> Vec<String> {
        hits.iter().map(|h| h.document.url.clone()).collect()
    }

    #[test]
    fn upsert_overwrites_by_id() {
        let store = store();
        let first = doc("https://a.com/x", "a.com", "casa perro", 60, 1);
        store.upsert_document(&first).unwrap();
        let mut second = doc("http://www.a.com/x/", "a.com", "gato", 70, 2);
        second.url = "https://a.com/x".to_string();
        store.upsert_document(&second).unwrap();

        assert_eq!(store.document_count().unwrap(), 1);
        let stored = store.get_document(&first.id).unwrap().unwrap();
        assert_eq!(stored.lemmatized_body, "gato");
        assert_eq!(stored.readability_score, 70);
    }

    #[test]
    fn document_frequencies_follow_upserts() {
        let store = store();
        store
            .upsert_document(&doc("https://a.com/1", "a.com", "casa casa perro", 60, 1))
            .unwrap();
        store
            .upsert_document(&doc("https://a.com/2", "a.com", "casa gato", 60, 1))
            .unwrap();

        let lemmas: Vec<LemmaId> = ["casa", "perro", "gato", "sol"].iter().map(|s| s.to_string()).collect();
        let df = store.document_frequencies(&lemmas).unwrap();
        assert_eq!(df["casa"], 2);
        assert_eq!(df["perro"], 1);
        assert_eq!(df["gato"], 1);
        assert_eq!(df["sol"], 0);

        // re-indexing page 1 without "perro" releases it
        store
            .upsert_document(&doc("https://a.com/1", "a.com", "casa sol", 60, 1))
            .unwrap();
        let df = store.document_frequencies(&lemmas).unwrap();
        assert_eq!(df["casa"], 2);
        assert_eq!(df["perro"], 0);
        assert_eq!(df["sol"], 1);

        // identical re-ingest changes nothing
        store
            .upsert_document(&doc("https://a.com/1", "a.com", "casa sol", 60, 1))
            .unwrap();
        assert_eq!(store.document_frequencies(&lemmas).unwrap()["casa"], 2);
    }

    #[test]
    fn search_filters_and_orders() {
        let store = store();
        store.upsert_document(&doc("https://a.com/old", "a.com", "casa", 60, 10)).unwrap();
        store.upsert_document(&doc("https://a.com/new", "a.com", "casa", 60, 20)).unwrap();
        store.upsert_document(&doc("https://a.com/both", "a.com", "casa casa", 60, 5)).unwrap();
        store.upsert_document(&doc("https://b.com/hard", "b.com", "casa", 10, 30)).unwrap();
        store.upsert_document(&doc("https://a.com/none", "a.com", "perro", 60, 40)).unwrap();

        let query = DocumentQuery {
            lemmas: vec!["casa".to_string()],
            ..Default::default()
        };
        assert_eq!(
            ids(&store.search(&query).unwrap()),
            vec![
                "https://a.com/both",
                "https://b.com/hard",
                "https://a.com/new",
                "https://a.com/old"
            ]
        );

        let query = DocumentQuery {
            lemmas: vec!["casa".to_string()],
            domains: Some(vec!["a.com".to_string()]),
            min_readability: Some(50),
            excluded_ids: [DocumentId::for_url("https://a.com/both").unwrap()].into_iter().collect(),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(ids(&store.search(&query).unwrap()), vec!["https://a.com/new"]);

        let query = DocumentQuery {
            min_version: Some(CURRENT_DOCUMENT_VERSION + 1),
            ..Default::default()
        };
        assert!(store.search(&query).unwrap().is_empty());

        // no terms: everything that passes the filters, newest first
        let all = store.search(&DocumentQuery::default()).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].document.url, "https://a.com/none");
    }

    #[test]
    fn episodes_round_trip() {
        use crate::index::document::AudioFile;
        use crate::types::SourceId;

        let store = store();
        let source = SourceId::new("radio");
        let episode = PodcastEpisode {
            id: PodcastEpisode::id_for(&source, "g1"),
            title: "Uno".to_string(),
            description: String::new(),
            publication_date: chrono::Utc::now(),
            episode_type: "full".to_string(),
            duration_secs: 60,
            is_explicit: false,
            audio_file: AudioFile {
                url: "https://radio.example.com/1.mp3".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
            guid: "g1".to_string(),
            version: 1,
            language_code: LanguageCode::Spanish,
            source_id: source,
        };
        store.upsert_episode(&episode).unwrap();
        store.upsert_episode(&episode).unwrap();
        assert_eq!(store.get_episode(&episode.id).unwrap(), Some(episode));
        assert!(store.get_episode("missing").unwrap().is_none());
    }
}
