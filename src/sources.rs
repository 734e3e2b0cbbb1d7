//! Source catalog
//!
//! Sources are configuration: a TOML file of `[[source]]` tables read at
//! startup and re-read whenever an orchestrator refreshes, so sources can be
//! added or deactivated without a restart. The pipeline never writes here.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::scraping::urls::parse_url;
use crate::types::{IngestStrategy, LanguageCode, SourceId, SourceSeed};

/// How a source marks paywalled pages. Exactly one strategy per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum PaywallFilter {
    /// `isAccessibleForFree` in an `application/ld+json` script block
    LdJson,
    /// Any element carrying one of these class names
    Classes { classes: Vec<String> },
    /// Any element with one of these ids
    Ids { ids: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    pub url: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A `[[source]]` table as written in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    pub ingest_strategy: IngestStrategy,
    #[serde(default)]
    pub country: String,
    pub language_code: LanguageCode,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub should_use_url_as_seed_url: bool,
    /// Overrides the strategy's time-until-free (seconds)
    #[serde(default)]
    pub rate_limit_secs: Option<u64>,
    #[serde(default)]
    pub paywall: Option<PaywallFilter>,
    #[serde(default)]
    pub seeds: Vec<SeedEntry>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    source: Vec<SourceEntry>,
}

/// A validated source
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub ingest_strategy: IngestStrategy,
    pub country: String,
    pub language_code: LanguageCode,
    pub is_active: bool,
    pub time_until_free: Option<Duration>,
    pub paywall: Option<PaywallFilter>,
    pub seeds: Vec<SourceSeed>,
}

impl Source {
    /// True if `url_identifier` is one of this source's seed pages
    pub fn is_seed(&self, url_identifier: &str) -> bool {
        self.seeds.iter().any(|seed| {
            parse_url(&seed.url)
                .map(|p| p.url_identifier == url_identifier)
                .unwrap_or(false)
        })
    }

    pub fn active_seeds(&self) -> impl Iterator<Item = &SourceSeed> {
        self.seeds.iter().filter(|s| s.is_active)
    }

    /// Language of a page from this source. A page without a `lang`
    /// attribute is in the source's language; `None` means the attribute
    /// names a language that cannot be processed.
    pub fn page_language(&self, html_lang: Option<&str>) -> Option<LanguageCode> {
        match html_lang.map(str::trim).filter(|lang| !lang.is_empty()) {
            Some(lang) => LanguageCode::from_html_lang(lang),
            None => Some(self.language_code),
        }
    }
}

/// Immutable snapshot of the configured sources
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<Source>,
    by_id: HashMap<SourceId, usize>,
    by_domain: HashMap<String, usize>,
}

impl SourceCatalog {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).context("Failed to parse source catalog")?;
        Self::from_entries(file.source)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source catalog '{}'", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_entries(entries: Vec<SourceEntry>) -> Result<Self> {
        let mut catalog = SourceCatalog::default();
        let mut errors = Vec::new();

        for entry in entries {
            let id = SourceId::new(entry.id.clone());
            if catalog.by_id.contains_key(&id) {
                errors.push(format!("duplicate source id '{}'", id));
                continue;
            }
            let Some(parsed) = parse_url(&entry.url) else {
                errors.push(format!("source '{}' has an invalid url '{}'", id, entry.url));
                continue;
            };
            if let Some(PaywallFilter::Classes { classes }) = &entry.paywall {
                if classes.is_empty() {
                    errors.push(format!("source '{}' has an empty paywall class list", id));
                }
            }
            if let Some(PaywallFilter::Ids { ids }) = &entry.paywall {
                if ids.is_empty() {
                    errors.push(format!("source '{}' has an empty paywall id list", id));
                }
            }

            let mut seed_urls: Vec<(String, bool)> = Vec::new();
            if entry.should_use_url_as_seed_url {
                seed_urls.push((entry.url.clone(), true));
            }
            seed_urls.extend(entry.seeds.iter().map(|s| (s.url.clone(), s.is_active)));
            let seeds = seed_urls
                .into_iter()
                .enumerate()
                .map(|(n, (url, is_active))| SourceSeed {
                    id: format!("{}-seed-{}", id, n),
                    source_id: id.clone(),
                    url,
                    is_active,
                })
                .collect();

            let index = catalog.sources.len();
            if let Some(previous) = catalog.by_domain.insert(parsed.domain.clone(), index) {
                errors.push(format!(
                    "sources '{}' and '{}' share the domain '{}'",
                    catalog.sources[previous].id, id, parsed.domain
                ));
            }
            catalog.by_id.insert(id.clone(), index);
            catalog.sources.push(Source {
                id,
                title: entry.title,
                url: entry.url,
                domain: parsed.domain,
                ingest_strategy: entry.ingest_strategy,
                country: entry.country,
                language_code: entry.language_code,
                is_active: entry.is_active,
                time_until_free: entry.rate_limit_secs.map(Duration::from_secs),
                paywall: entry.paywall,
                seeds,
            });
        }

        if errors.is_empty() {
            Ok(catalog)
        } else {
            anyhow::bail!("Source catalog is invalid:\n  - {}", errors.join("\n  - "));
        }
    }

    pub fn get(&self, id: &SourceId) -> Option<&Source> {
        self.by_id.get(id).map(|&i| &self.sources[i])
    }

    /// Source owning a registrable domain
    pub fn for_domain(&self, domain: &str) -> Option<&Source> {
        self.by_domain.get(domain).map(|&i| &self.sources[i])
    }

    /// Active sources for a strategy, in catalog order
    pub fn active_for(&self, strategy: IngestStrategy) -> Vec<&Source> {
        self.sources
            .iter()
            .filter(|s| s.is_active && s.ingest_strategy == strategy)
            .collect()
    }

    pub fn all(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Where catalogs come from
pub trait SourceProvider: Send + Sync {
    fn load(&self) -> Result<SourceCatalog>;
}

/// Reads the catalog file on every load
pub struct FileSourceProvider {
    path: PathBuf,
}

impl FileSourceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceProvider for FileSourceProvider {
    fn load(&self) -> Result<SourceCatalog> {
        SourceCatalog::load(&self.path)
    }
}

/// A fixed catalog
pub struct StaticSourceProvider(pub SourceCatalog);

impl SourceProvider for StaticSourceProvider {
    fn load(&self) -> Result<SourceCatalog> {
        Ok(self.0.clone())
    }
}

/// The current catalog, swapped atomically on reload
pub struct SharedCatalog {
    provider: Arc<dyn SourceProvider>,
    current: RwLock<Arc<SourceCatalog>>,
}

impl SharedCatalog {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Result<Self> {
        let current = provider.load()?;
        Ok(Self {
            provider,
            current: RwLock::new(Arc::new(current)),
        })
    }

    pub fn snapshot(&self) -> Arc<SourceCatalog> {
        self.current.read().clone()
    }

    /// Re-read the catalog. On failure the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<SourceCatalog>> {
        let fresh = Arc::new(self.provider.load()?);
        *self.current.write() = fresh.clone();
        Ok(fresh)
    }
}
