//! Field mapping table
//!
//! Declares, per entity type, which source column feeds which target field
//! and how the text is coerced. The table is validated once when the pipeline
//! is loaded, not per row.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashSet;
use thiserror::Error;

use super::outcome::SkipReason;

/// How a cell is turned into a JSON value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
    /// Resolved to a remote id through the named reference map
    Reference(String),
}

impl FieldKind {
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Reference(_))
    }

    /// Coerce a trimmed, non-empty cell. References are resolved elsewhere.
    pub fn coerce(&self, field: &str, raw: &str) -> Result<Value, SkipReason> {
        match self {
            FieldKind::Text | FieldKind::Reference(_) => Ok(Value::String(raw.to_string())),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| SkipReason::InvalidNumeric {
                    field: field.to_string(),
                }),
            FieldKind::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| SkipReason::InvalidNumeric {
                    field: field.to_string(),
                }),
            FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(SkipReason::InvalidBoolean {
                    field: field.to_string(),
                }),
            },
        }
    }
}

/// Source column → target field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub column: String,
    pub target: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldMapping {
    #[cfg(test)]
    pub fn new(column: impl Into<String>, target: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            column: column.into(),
            target: target.into(),
            kind,
        }
    }
}

/// Mapping of one CSV source onto one remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub collection: String,
    /// Target fields whose values identify an entity
    pub unique: Vec<String>,
    /// Field set to the creation timestamp so new entities are visible
    #[serde(default)]
    pub publish_field: Option<String>,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("collection name is empty")]
    EmptyCollection,
    #[error("no unique field declared")]
    NoUniqueField,
    #[error("unique field '{0}' has no column mapping")]
    UnmappedUniqueField(String),
    #[error("unique field '{0}' cannot be a reference")]
    ReferenceUniqueField(String),
    #[error("target field '{0}' is mapped more than once")]
    DuplicateTarget(String),
    #[error("field '{field}' uses unknown reference '{reference}'")]
    UnknownReference { field: String, reference: String },
    #[error("input has no column '{column}' for unique field '{field}'")]
    MissingUniqueColumn { field: String, column: String },
}

impl EntityMapping {
    /// Check the table against the declared reference names
    pub fn validate(&self, known_references: &HashSet<&str>) -> Result<(), MappingError> {
        if self.collection.trim().is_empty() {
            return Err(MappingError::EmptyCollection);
        }
        if self.unique.is_empty() {
            return Err(MappingError::NoUniqueField);
        }

        let mut targets = HashSet::new();
        for field in &self.fields {
            if !targets.insert(field.target.as_str()) {
                return Err(MappingError::DuplicateTarget(field.target.clone()));
            }
            if let FieldKind::Reference(reference) = &field.kind {
                if !known_references.contains(reference.as_str()) {
                    return Err(MappingError::UnknownReference {
                        field: field.target.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        for unique in &self.unique {
            let mapping = self
                .field(unique)
                .ok_or_else(|| MappingError::UnmappedUniqueField(unique.clone()))?;
            if mapping.kind.is_reference() {
                return Err(MappingError::ReferenceUniqueField(unique.clone()));
            }
        }

        Ok(())
    }

    /// Check an input's header row; only unique columns are mandatory
    pub fn check_headers(&self, headers: &[String]) -> Result<(), MappingError> {
        let present: HashSet<&str> = headers.iter().map(String::as_str).collect();

        for unique in &self.unique {
            if let Some(mapping) = self.field(unique) {
                if !present.contains(mapping.column.as_str()) {
                    return Err(MappingError::MissingUniqueColumn {
                        field: unique.clone(),
                        column: mapping.column.clone(),
                    });
                }
            }
        }

        for mapping in &self.fields {
            if !present.contains(mapping.column.as_str()) {
                log::warn!(
                    "Column '{}' for field '{}' is not in the input; the field will not be sent",
                    mapping.column,
                    mapping.target
                );
            }
        }

        Ok(())
    }

    /// Mapping for a target field
    pub fn field(&self, target: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.target == target)
    }

    /// Names of the reference maps this mapping reads
    pub fn references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            if let FieldKind::Reference(name) = &field.kind {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}
