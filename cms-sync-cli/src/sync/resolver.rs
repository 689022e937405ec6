//! Upsert resolver
//!
//! Turns one record into an [`UpsertTask`] (validation, coercion, reference
//! resolution; no network) and then decides create vs. update for it against
//! the remote store.

use chrono::Utc;
use log::{debug, warn};
use serde_json::{Map, Value};

use super::cache::{ReferenceCache, key_text};
use super::mapping::{EntityMapping, FieldKind};
use super::outcome::{Outcome, SkipReason};
use super::record::Record;
use crate::api::{ListQuery, MutationResult, RemoteEntity, RemoteStore, TransportError};

/// A record ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertTask {
    /// `line N (field=value)`, used in reports
    pub label: String,
    pub collection: String,
    /// Unique target fields with the coerced value rendered as filter text
    pub unique: Vec<(String, String)>,
    /// Only the fields present and non-empty in the record
    pub payload: Map<String, Value>,
}

impl UpsertTask {
    /// Tasks with equal serial keys target the same remote entity
    pub fn serial_key(&self) -> String {
        let mut key = self.collection.clone();
        for (field, value) in &self.unique {
            key.push('\u{1f}');
            key.push_str(field);
            key.push('=');
            key.push_str(value);
        }
        key
    }
}

/// A record rejected before any network call
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub label: String,
    pub reason: SkipReason,
}

/// Build the task for one record without touching the network
pub fn prepare_task(
    mapping: &EntityMapping,
    references: &ReferenceCache,
    record: &Record,
) -> Result<UpsertTask, Rejected> {
    let mut cells = Vec::with_capacity(mapping.unique.len());
    for field in &mapping.unique {
        let value = mapping
            .field(field)
            .and_then(|column| record.value(&column.column));
        match value {
            Some(value) => cells.push((field.as_str(), value)),
            None => {
                return Err(Rejected {
                    label: format!("line {}", record.line()),
                    reason: SkipReason::MissingUniqueKey,
                });
            }
        }
    }

    let label = format!(
        "line {} ({})",
        record.line(),
        cells
            .iter()
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut payload = Map::new();
    for field in &mapping.fields {
        let Some(raw) = record.value(&field.column) else {
            continue;
        };

        let value = match &field.kind {
            FieldKind::Reference(reference) => {
                match references.resolve(reference, raw) {
                    Some(id) => id.to_json(),
                    None => {
                        debug!(
                            "{}: '{}' not found in reference '{}', omitting '{}'",
                            label, raw, reference, field.target
                        );
                        continue;
                    }
                }
            }
            kind => kind.coerce(&field.target, raw).map_err(|reason| Rejected {
                label: label.clone(),
                reason,
            })?,
        };

        payload.insert(field.target.clone(), value);
    }

    // `7` and `07` under an integer field must address the same entity
    let mut unique = Vec::with_capacity(cells.len());
    for (field, _) in &cells {
        match payload.get(*field).and_then(key_text) {
            Some(text) => unique.push((field.to_string(), text)),
            None => {
                return Err(Rejected {
                    label,
                    reason: SkipReason::MissingUniqueKey,
                });
            }
        }
    }

    Ok(UpsertTask {
        label,
        collection: mapping.collection.clone(),
        unique,
        payload,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub dry_run: bool,
    /// Skip the update when the remote entity already holds the payload
    pub skip_unchanged: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_unchanged: true,
        }
    }
}

pub struct UpsertResolver<'a, S: ?Sized> {
    store: &'a S,
    mapping: &'a EntityMapping,
    references: &'a ReferenceCache,
    options: ResolverOptions,
}

impl<'a, S: RemoteStore + ?Sized> UpsertResolver<'a, S> {
    pub fn new(
        store: &'a S,
        mapping: &'a EntityMapping,
        references: &'a ReferenceCache,
        options: ResolverOptions,
    ) -> Self {
        Self {
            store,
            mapping,
            references,
            options,
        }
    }

    /// Validate and coerce a record. Unresolved references are left out of
    /// the payload rather than rejecting the record.
    pub fn prepare(&self, record: &Record) -> Result<UpsertTask, Rejected> {
        prepare_task(self.mapping, self.references, record)
    }

    /// Bring the remote store in line with one task
    pub async fn execute(&self, task: &UpsertTask) -> Outcome {
        if self.options.dry_run {
            return Outcome::DrySimulated {
                payload: Value::Object(task.payload.clone()),
            };
        }

        let existing = match self.lookup(task).await {
            Ok(existing) => existing,
            Err(e) => return Outcome::failed(format!("lookup failed: {}", e)),
        };

        match existing {
            Some(entity) => self.update(task, entity).await,
            None => self.create(task).await,
        }
    }

    /// One filtered query of page size 1; a 404 counts as "not found"
    async fn lookup(&self, task: &UpsertTask) -> Result<Option<RemoteEntity>, TransportError> {
        let query = task
            .unique
            .iter()
            .fold(ListQuery::new().page_size(1), |query, (field, value)| {
                query.filter(field, value)
            });

        let page = match self.store.list(&task.collection, &query).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if let Some(meta) = &page.meta {
            if meta.total > 1 {
                warn!(
                    "{}: {} entities in '{}' share this key, updating the first",
                    task.label, meta.total, task.collection
                );
            }
        }

        Ok(page.items.into_iter().next())
    }

    async fn update(&self, task: &UpsertTask, entity: RemoteEntity) -> Outcome {
        if self.options.skip_unchanged && entity.matches(&task.payload) {
            debug!("{}: entity {} is up to date", task.label, entity.id);
            return Outcome::Skipped(SkipReason::NoChanges);
        }

        let fields = Value::Object(task.payload.clone());
        match self.store.update(&task.collection, &entity.id, &fields).await {
            Ok(MutationResult::Applied(id)) => Outcome::Updated { id },
            Ok(MutationResult::Simulated { method, path, body }) => {
                debug!("{}: would {} {}", task.label, method, path);
                Outcome::DrySimulated { payload: body }
            }
            Err(e) => Outcome::failed(format!("update of {} failed: {}", entity.id, e)),
        }
    }

    async fn create(&self, task: &UpsertTask) -> Outcome {
        let mut payload = task.payload.clone();
        if let Some(field) = &self.mapping.publish_field {
            payload
                .entry(field.clone())
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        }

        let fields = Value::Object(payload);
        match self.store.create(&task.collection, &fields).await {
            Ok(MutationResult::Applied(id)) => Outcome::Created { id },
            Ok(MutationResult::Simulated { method, path, body }) => {
                debug!("{}: would {} {}", task.label, method, path);
                Outcome::DrySimulated { payload: body }
            }
            Err(e) => Outcome::failed(format!("create failed: {}", e)),
        }
    }
}
