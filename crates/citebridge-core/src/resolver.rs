//! Citation key resolution.
//!
//! # Algorithm
//!
//! 1. Return the cached item if the key resolved before.
//! 2. Parse the key; failure is [`Error::MalformedKey`].
//! 3. Search for items pinned to the key by an `@<key>` tag or note. Any hit
//!    is authoritative and skips the fuzzy search.
//! 4. Otherwise run the fuzzy field search built from the parsed key.
//! 5. With several candidates, keep those in the user's personal library;
//!    still several is [`Error::Ambiguous`], none is [`Error::NotFound`].
//! 6. Cache the winner.
//!
//! Every search hit is canonicalized first: a child note or attachment is
//! replaced by its parent, then duplicates are dropped by item id.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::{Host, Item};
use crate::key::parse_key;
use crate::query::{QuickSearchMode, SearchQuery};

/// Process-lifetime map from citation key to resolved item.
///
/// Entries are never evicted or revalidated: once a key resolves it keeps
/// resolving to the same item even if the library changes underneath.
/// Failures are not cached.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, Item>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Item> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, item: Item) {
        self.entries.write().unwrap().insert(key.to_string(), item);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits a comma-separated key list, trimming entries and dropping empty ones.
pub fn split_keys(keys: &str) -> impl Iterator<Item = &str> {
    keys.split(',').map(str::trim).filter(|k| !k.is_empty())
}

/// Resolves keys and identifiers to items through a [`Host`].
#[derive(Clone)]
pub struct Resolver {
    host: Arc<dyn Host>,
    cache: Arc<ResolutionCache>,
}

impl Resolver {
    pub fn new(host: Arc<dyn Host>, cache: Arc<ResolutionCache>) -> Self {
        Self { host, cache }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolves one citation key to exactly one item.
    pub async fn resolve(&self, key: &str) -> Result<Item> {
        if let Some(item) = self.cache.get(key) {
            debug!(key, "resolution cache hit");
            return Ok(item);
        }

        let parsed = parse_key(key).ok_or_else(|| Error::MalformedKey(key.to_string()))?;

        let pinned = self.run_search(&SearchQuery::pinned_key(key)).await?;
        let candidates = if pinned.is_empty() {
            let found = self.run_search(&SearchQuery::for_parsed_key(&parsed)).await?;
            debug!(key, candidates = found.len(), "fuzzy key search");
            found
        } else {
            debug!(key, candidates = pinned.len(), "pinned key search");
            pinned
        };

        let item = self.disambiguate(key, candidates)?;
        self.cache.insert(key, item.clone());
        Ok(item)
    }

    /// Resolves a comma-separated key list in order. Any failure fails the
    /// whole batch.
    pub async fn resolve_many(&self, keys: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for key in split_keys(keys) {
            items.push(self.resolve(key).await?);
        }
        Ok(items)
    }

    fn disambiguate(&self, key: &str, mut candidates: Vec<Item>) -> Result<Item> {
        if candidates.len() > 1 {
            let user_library = self.host.user_library_id();
            candidates.retain(|item| item.library_id == user_library);
            if candidates.len() != 1 {
                return Err(Error::Ambiguous(format!(
                    "multiple items found for key {}",
                    key
                )));
            }
        }
        candidates
            .pop()
            .ok_or_else(|| Error::NotFound(format!("no item found for key {}", key)))
    }

    /// Looks up an item by identifier: `<lib>/<key>`, `<lib>_<key>`, or a
    /// bare key in the user library.
    pub async fn find_by_key(&self, key: &str) -> Result<Item> {
        let not_found = || Error::NotFound(format!("{} not found", key));
        let (library_id, item_key) = match key.split_once('/').or_else(|| key.split_once('_')) {
            Some((lib, item_key)) => (lib.parse::<i64>().map_err(|_| not_found())?, item_key),
            None => (self.host.user_library_id(), key),
        };
        self.host
            .item_by_key(library_id, item_key)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn find_many_by_key(&self, keys: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for key in split_keys(keys) {
            items.push(self.find_by_key(key).await?);
        }
        Ok(items)
    }

    fn require_citation_keys(&self) -> Result<()> {
        if self.host.supports_citation_keys() {
            Ok(())
        } else {
            Err(Error::Unsupported(
                "citation keys are not available in this library".to_string(),
            ))
        }
    }

    /// Exact match on the citation-key field within the user library.
    pub async fn find_by_citation_key(&self, citekey: &str) -> Result<Item> {
        self.require_citation_keys()?;
        let query = SearchQuery::citation_key(citekey, self.host.user_library_id());
        let ids = self.host.search(&query).await?;
        match ids.first() {
            Some(id) => self
                .host
                .item(*id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} not found", citekey))),
            None => Err(Error::NotFound(format!("{} not found", citekey))),
        }
    }

    pub async fn find_many_by_citation_key(&self, keys: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for key in split_keys(keys) {
            items.push(self.find_by_citation_key(key).await?);
        }
        Ok(items)
    }

    /// All items matching a possibly partial easy key, without
    /// disambiguation or caching.
    pub async fn complete_easy_key(&self, partial: &str) -> Result<Vec<Item>> {
        let parsed = parse_key(partial).ok_or_else(|| Error::MalformedKey(partial.to_string()))?;
        self.run_search(&SearchQuery::for_parsed_key(&parsed)).await
    }

    /// Citation keys in the user library starting with `prefix`.
    pub async fn complete_citation_key(&self, prefix: &str) -> Result<Vec<String>> {
        self.require_citation_keys()?;
        let query = SearchQuery::citation_key_containing(prefix, self.host.user_library_id());
        let mut keys = Vec::new();
        for id in self.host.search(&query).await? {
            let Some(item) = self.host.item(id).await? else {
                continue;
            };
            if let Some(citekey) = self.host.citation_key(&item).await? {
                if citekey.starts_with(prefix) {
                    keys.push(citekey);
                }
            }
        }
        Ok(keys)
    }

    /// Quick search over one library or all of them.
    pub async fn search(
        &self,
        text: &str,
        mode: QuickSearchMode,
        library_id: Option<i64>,
    ) -> Result<Vec<Item>> {
        let query = SearchQuery::quick(text, mode).in_library(library_id);
        self.run_search(&query).await
    }

    /// Runs a search, canonicalizes every hit, and drops duplicates.
    pub async fn run_search(&self, query: &SearchQuery) -> Result<Vec<Item>> {
        let ids = self.host.search(query).await?;
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(item) = self.host.item(id).await? else {
                warn!(id, "search returned an id with no item");
                continue;
            };
            let item = self.canonical(item).await?;
            if seen.insert(item.id) {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// The item itself, or its parent for child notes and attachments.
    async fn canonical(&self, item: Item) -> Result<Item> {
        if item.is_regular() {
            return Ok(item);
        }
        let Some(parent_key) = item.parent_key.as_deref() else {
            return Ok(item);
        };
        match self.host.item_by_key(item.library_id, parent_key).await? {
            Some(parent) => Ok(parent),
            None => {
                warn!(key = %item.library_key(), parent_key, "parent item missing");
                Ok(item)
            }
        }
    }
}
