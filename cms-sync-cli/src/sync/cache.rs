//! Reference cache
//!
//! Preloads natural-key → remote-id maps for collections that other records
//! point at by name, so resolving a foreign key is a hash lookup instead of
//! one request per record.

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use super::record::NaturalKey;
use crate::api::{ListQuery, RemoteId, RemoteStore, TransportError};
use crate::config::ReferenceDefinition;

/// A reference preload failed after the transport's own retries
#[derive(Debug, Clone, Error)]
#[error("failed to preload reference '{reference}' from '{collection}' (page {page}): {source}")]
pub struct CacheLoadError {
    pub reference: String,
    pub collection: String,
    pub page: u32,
    #[source]
    pub source: TransportError,
}

/// Natural key → remote id for one referenced collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceMap {
    entries: HashMap<NaturalKey, RemoteId>,
    collisions: usize,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; on collision the new id wins and the old one is returned
    pub fn insert(&mut self, key: NaturalKey, id: RemoteId) -> Option<RemoteId> {
        let previous = self.entries.insert(key, id);
        if previous.is_some() {
            self.collisions += 1;
        }
        previous
    }

    /// Look up a raw value with the same normalization used at load time
    pub fn get(&self, raw: &str) -> Option<&RemoteId> {
        let key = NaturalKey::new(raw);
        if key.is_empty() {
            return None;
        }
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

impl<K: AsRef<str>> FromIterator<(K, RemoteId)> for ReferenceMap {
    fn from_iter<I: IntoIterator<Item = (K, RemoteId)>>(iter: I) -> Self {
        let mut map = ReferenceMap::new();
        for (key, id) in iter {
            map.insert(NaturalKey::new(key.as_ref()), id);
        }
        map
    }
}

/// Text form of a scalar as the store compares it in filters
pub(crate) fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Page through a whole collection and build its reference map.
///
/// Stops on a short page, an empty page, or when the reported page count is
/// reached.
pub async fn preload<S: RemoteStore + ?Sized>(
    store: &S,
    reference: &ReferenceDefinition,
    page_size: u32,
) -> Result<ReferenceMap, CacheLoadError> {
    let page_size = page_size.max(1);
    let mut map = ReferenceMap::new();
    let mut page = 1;

    loop {
        let query = ListQuery::new().page(page).page_size(page_size);
        let result = store
            .list(&reference.collection, &query)
            .await
            .map_err(|source| CacheLoadError {
                reference: reference.name.clone(),
                collection: reference.collection.clone(),
                page,
                source,
            })?;

        debug!(
            "Reference '{}': page {} returned {} items",
            reference.name,
            page,
            result.items.len()
        );

        for entity in &result.items {
            let Some(raw) = entity.attribute(&reference.key_field).and_then(key_text) else {
                continue;
            };
            let key = NaturalKey::new(&raw);
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = map.insert(key.clone(), entity.id.clone()) {
                if previous != entity.id {
                    warn!(
                        "Reference '{}': key '{}' maps to both {} and {} (using {})",
                        reference.name, key, previous, entity.id, entity.id
                    );
                }
            }
        }

        if result.is_last(page_size) {
            break;
        }
        page += 1;
    }

    info!(
        "Reference '{}' loaded: {} keys from '{}' ({} collisions)",
        reference.name,
        map.len(),
        reference.collection,
        map.collisions()
    );

    Ok(map)
}

/// All reference maps available to one stage, read-only once built
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    maps: HashMap<String, ReferenceMap>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, map: ReferenceMap) {
        self.maps.insert(name.into(), map);
    }

    /// Resolve a raw cell through the named map
    pub fn resolve(&self, name: &str, raw: &str) -> Option<&RemoteId> {
        self.maps.get(name).and_then(|map| map.get(raw))
    }
}
