// Champion catalog: display name <-> numeric id, loaded once per session from
// the public Data Dragon dataset.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed champion dataset: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Champion {
    pub id: i64,
    pub name: String,
}

/// Static-for-the-session name -> id mapping.
#[derive(Debug, Clone, Default)]
pub struct ChampionCatalog {
    /// Sorted by name.
    champions: Vec<Champion>,
    by_name: HashMap<String, i64>,
    by_lower: HashMap<String, i64>,
}

impl ChampionCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = Champion>) -> Self {
        let mut champions: Vec<Champion> = entries.into_iter().collect();
        champions.sort_by(|a, b| a.name.cmp(&b.name));
        let by_name = champions.iter().map(|c| (c.name.clone(), c.id)).collect();
        let by_lower = champions
            .iter()
            .map(|c| (c.name.to_lowercase(), c.id))
            .collect();
        Self {
            champions,
            by_name,
            by_lower,
        }
    }

    /// Parse a `champion.json` document. Each entry's `key` is the numeric
    /// id as a string.
    pub fn from_ddragon_json(text: &str) -> Result<Self, CatalogError> {
        #[derive(Deserialize)]
        struct Dataset {
            data: HashMap<String, Entry>,
        }
        #[derive(Deserialize)]
        struct Entry {
            key: String,
            name: String,
        }

        let dataset: Dataset =
            serde_json::from_str(text).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        let mut champions = Vec::with_capacity(dataset.data.len());
        for (slug, entry) in dataset.data {
            let id = entry.key.parse::<i64>().map_err(|_| {
                CatalogError::Malformed(format!("champion {slug} has non-numeric key {}", entry.key))
            })?;
            champions.push(Champion {
                id,
                name: entry.name,
            });
        }
        Ok(Self::from_entries(champions))
    }

    /// Resolve a display name: exact match first, then case-insensitive.
    /// Blank names resolve to nothing.
    pub fn resolve(&self, name: &str) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.by_name
            .get(name)
            .or_else(|| self.by_lower.get(&name.to_lowercase()))
            .copied()
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.champions
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    pub fn all(&self) -> &[Champion] {
        &self.champions
    }

    pub fn len(&self) -> usize {
        self.champions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.champions.is_empty()
    }

    /// Case-insensitive search; names starting with `filter` come before
    /// names that merely contain it.
    pub fn search(&self, filter: &str) -> Vec<&Champion> {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return self.champions.iter().collect();
        }
        let (mut prefix, mut contains) = (Vec::new(), Vec::new());
        for champion in &self.champions {
            let lower = champion.name.to_lowercase();
            if lower.starts_with(&needle) {
                prefix.push(champion);
            } else if lower.contains(&needle) {
                contains.push(champion);
            }
        }
        prefix.extend(contains);
        prefix
    }
}

// ---------------------------------------------------------------------------
// Data Dragon fetcher
// ---------------------------------------------------------------------------

pub struct DataDragon {
    http: reqwest::Client,
    base_url: String,
    locale: String,
    fallback_version: String,
}

impl DataDragon {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder().timeout(CATALOG_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            locale: config.locale.clone(),
            fallback_version: config.fallback_version.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, CatalogError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Newest dataset version, or the configured fallback when the version
    /// list is unavailable.
    pub async fn latest_version(&self) -> String {
        let url = format!("{}/api/versions.json", self.base_url);
        let versions = match self.get_text(&url).await {
            Ok(text) => serde_json::from_str::<Vec<String>>(&text).ok(),
            Err(e) => {
                warn!("Could not fetch catalog versions: {e}");
                None
            }
        };
        match versions.and_then(|v| v.into_iter().next()) {
            Some(version) => version,
            None => {
                debug!(version = %self.fallback_version, "Using fallback catalog version");
                self.fallback_version.clone()
            }
        }
    }

    pub async fn fetch_catalog(&self) -> Result<ChampionCatalog, CatalogError> {
        let version = self.latest_version().await;
        let url = format!(
            "{}/cdn/{version}/data/{}/champion.json",
            self.base_url, self.locale
        );
        let catalog = ChampionCatalog::from_ddragon_json(&self.get_text(&url).await?)?;
        info!(version = %version, count = catalog.len(), "Champion catalog loaded");
        Ok(catalog)
    }
}
