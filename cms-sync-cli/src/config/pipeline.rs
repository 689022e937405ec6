//! Pipeline definition file
//!
//! A TOML file listing the reference collections and the import stages in the
//! order they must run:
//!
//! ```toml
//! [[reference]]
//! name = "regions"
//! collection = "regions"
//! key_field = "name"
//!
//! [[stage]]
//! name = "stores"
//! input = "stores.csv"
//! collection = "stores"
//! unique = ["code"]
//! publish_field = "publishedAt"
//!
//! [[stage.field]]
//! column = "Code"
//! target = "code"
//!
//! [[stage.field]]
//! column = "Region"
//! target = "region"
//! kind = { reference = "regions" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;
use crate::sync::mapping::EntityMapping;

/// A collection that records refer to by a human-readable field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDefinition {
    pub name: String,
    pub collection: String,
    /// Attribute holding the natural key (e.g. `name`)
    pub key_field: String,
}

/// One entity type imported from one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub input: PathBuf,
    #[serde(flatten)]
    pub mapping: EntityMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default, rename = "reference")]
    pub references: Vec<ReferenceDefinition>,
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    /// Read, resolve input paths against the file's directory, and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::PipelineRead {
            path: path.to_path_buf(),
            source,
        })?;

        let mut definition = Self::parse(&content).map_err(|source| ConfigError::PipelineParse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(dir) = path.parent() {
            for stage in &mut definition.stages {
                if stage.input.is_relative() {
                    stage.input = dir.join(&stage.input);
                }
            }
        }

        definition.validate()?;
        Ok(definition)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Structural checks done once, before any row is read
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Pipeline("no stage declared".to_string()));
        }

        let mut reference_names = HashSet::new();
        for reference in &self.references {
            if reference.name.trim().is_empty()
                || reference.collection.trim().is_empty()
                || reference.key_field.trim().is_empty()
            {
                return Err(ConfigError::Pipeline(format!(
                    "reference '{}' needs a name, a collection and a key_field",
                    reference.name
                )));
            }
            if !reference_names.insert(reference.name.as_str()) {
                return Err(ConfigError::Pipeline(format!(
                    "reference '{}' is declared twice",
                    reference.name
                )));
            }
        }

        let mut stage_names = HashSet::new();
        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(ConfigError::Pipeline(format!(
                    "stage '{}' is declared twice",
                    stage.name
                )));
            }
            stage
                .mapping
                .validate(&reference_names)
                .map_err(|source| ConfigError::Stage {
                    stage: stage.name.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn reference(&self, name: &str) -> Option<&ReferenceDefinition> {
        self.references.iter().find(|r| r.name == name)
    }

    /// Keep only the named stage, optionally reading from another file
    pub fn single_stage(&self, name: &str, input: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut stage = self
            .stage(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownStage(name.to_string()))?;
        if let Some(input) = input {
            stage.input = input;
        }
        Ok(Self {
            references: self.references.clone(),
            stages: vec![stage],
        })
    }
}
