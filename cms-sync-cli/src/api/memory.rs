//! In-memory remote store used by tests
//!
//! Mimics the collection API closely enough for pipeline tests: exact-match
//! filters, paging with pagination metadata, numeric ids. Calls can be slowed
//! down to make concurrency observable, and failures can be queued per HTTP
//! method.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::error::TransportError;
use super::models::{MutationResult, Page, PageMeta, RemoteEntity, RemoteId};
use super::query::ListQuery;
use super::store::RemoteStore;

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<RemoteEntity>>>,
    failures: Mutex<HashMap<&'static str, VecDeque<TransportError>>>,
    calls: Mutex<Vec<(&'static str, String)>>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Duration,
}

/// Decrements the in-flight gauge when a call ends
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Every call sleeps this long while counted as in flight
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Insert entities with fresh ids
    pub fn seed(&self, collection: &str, items: Vec<Value>) {
        let mut collections = self.collections.lock().unwrap();
        let entries = collections.entry(collection.to_string()).or_default();
        for item in items {
            let id = RemoteId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
            let attributes = item.as_object().cloned().unwrap_or_default();
            entries.push(RemoteEntity { id, attributes });
        }
    }

    /// Queue errors returned by the next calls of `method` (GET, POST, PUT)
    pub fn fail_next(&self, method: &'static str, errors: Vec<TransportError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .extend(errors);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn entities(&self, collection: &str) -> Vec<RemoteEntity> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls_for(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == method)
            .count()
    }

    /// Number of non-GET calls received
    pub fn mutation_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m != "GET")
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, method: &'static str, collection: &str) -> Result<InFlight<'_>, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        self.calls
            .lock()
            .unwrap()
            .push((method, collection.to_string()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let injected = self
            .failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_fields(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, TransportError> {
        let _guard = self.enter("GET", collection).await?;

        let collections = self.collections.lock().unwrap();
        let matching: Vec<RemoteEntity> = collections
            .get(collection)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|entity| {
                        query.filters().iter().all(|(field, wanted)| {
                            entity
                                .attribute(field)
                                .is_some_and(|value| attribute_text(value) == *wanted)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let page_size = query.requested_page_size().unwrap_or(25).max(1);
        let page = query.current_page().max(1);
        let total = matching.len();
        let page_count = total.div_ceil(page_size as usize) as u32;

        let items = matching
            .into_iter()
            .skip((page as usize - 1) * page_size as usize)
            .take(page_size as usize)
            .collect();

        Ok(Page {
            items,
            meta: Some(PageMeta {
                page,
                page_count,
                total: total as u64,
            }),
        })
    }

    async fn create(
        &self,
        collection: &str,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        let _guard = self.enter("POST", collection).await?;

        let id = RemoteId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(RemoteEntity {
                id: id.clone(),
                attributes: as_fields(fields),
            });
        Ok(MutationResult::Applied(id))
    }

    async fn update(
        &self,
        collection: &str,
        id: &RemoteId,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        let _guard = self.enter("PUT", collection).await?;

        let mut collections = self.collections.lock().unwrap();
        let entity = collections
            .get_mut(collection)
            .and_then(|entities| entities.iter_mut().find(|e| &e.id == id))
            .ok_or_else(|| TransportError::Status {
                status: 404,
                message: "Not Found".to_string(),
            })?;

        entity.attributes.extend(as_fields(fields));
        Ok(MutationResult::Applied(id.clone()))
    }
}
