//! Response models for the CMS collection API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::error::TransportError;

/// Opaque identifier of a remote entity
///
/// Keeps the JSON shape the API used, so a string id made of digits is sent
/// back as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    Text(String),
}

impl RemoteId {
    /// Parse an `id` value as returned by the API
    pub fn from_json(value: &Value) -> Result<Self, TransportError> {
        match value {
            Value::Number(n) => Ok(match n.as_u64() {
                Some(n) => RemoteId::Number(n),
                None => RemoteId::Text(n.to_string()),
            }),
            Value::String(s) if !s.is_empty() => Ok(RemoteId::Text(s.clone())),
            other => Err(TransportError::Decode(format!(
                "expected an entity id, got {}",
                other
            ))),
        }
    }

    /// JSON form used in relation payloads
    pub fn to_json(&self) -> Value {
        match self {
            RemoteId::Number(n) => Value::from(*n),
            RemoteId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{}", n),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RemoteId {
    fn from(id: u64) -> Self {
        RemoteId::Number(id)
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        RemoteId::Text(id.to_string())
    }
}

/// One entity from a collection listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub id: RemoteId,
    pub attributes: Map<String, Value>,
}

impl RemoteEntity {
    /// Accepts both `{id, attributes: {..}}` and flat `{id, ..fields}` items
    pub fn from_json(item: &Value) -> Result<Self, TransportError> {
        let obj = item
            .as_object()
            .ok_or_else(|| TransportError::Decode(format!("expected an object, got {}", item)))?;

        let id = obj
            .get("id")
            .ok_or_else(|| TransportError::Decode("entity is missing 'id'".to_string()))
            .and_then(RemoteId::from_json)?;

        let attributes = match obj.get("attributes") {
            Some(Value::Object(attrs)) => attrs.clone(),
            _ => obj
                .iter()
                .filter(|(key, _)| key.as_str() != "id")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };

        Ok(RemoteEntity { id, attributes })
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// True when every field of `payload` already holds an equal value
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        payload.iter().all(|(field, wanted)| {
            self.attributes
                .get(field)
                .is_some_and(|current| values_equal(current, wanted))
        })
    }
}

/// Compare loosely so that `"5"` and `5` count as the same value
fn values_equal(current: &Value, wanted: &Value) -> bool {
    if current == wanted {
        return true;
    }
    match (current, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.trim() == b.to_string()
        }
        _ => false,
    }
}

/// Pagination block reported by the API
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMeta {
    pub page: u32,
    pub page_count: u32,
    pub total: u64,
}

/// One page of a collection listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RemoteEntity>,
    pub meta: Option<PageMeta>,
}

impl Page {
    /// Parse a `{data: [...], meta: {pagination: {...}}}` body
    pub fn from_json(body: &Value) -> Result<Self, TransportError> {
        let items = match body.get("data") {
            Some(Value::Array(items)) => items
                .iter()
                .map(RemoteEntity::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(TransportError::Decode(format!(
                    "expected 'data' to be a list, got {}",
                    other
                )));
            }
        };

        let meta = body
            .get("meta")
            .and_then(|meta| meta.get("pagination"))
            .map(|pagination| serde_json::from_value::<PageMeta>(pagination.clone()))
            .transpose()
            .map_err(|e| TransportError::Decode(format!("invalid pagination block: {}", e)))?;

        Ok(Page { items, meta })
    }

    /// Whether no further page needs to be requested
    pub fn is_last(&self, requested_page_size: u32) -> bool {
        if self.items.is_empty() || self.items.len() < requested_page_size as usize {
            return true;
        }
        match &self.meta {
            Some(meta) if meta.page_count > 0 => meta.page >= meta.page_count,
            _ => false,
        }
    }
}

/// Result of a mutating call
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult {
    /// The call was issued; carries the affected entity id
    Applied(RemoteId),
    /// Dry run: the call that would have been issued
    Simulated {
        method: String,
        path: String,
        body: Value,
    },
}
