//! Creation journal
//!
//! Nothing is rolled back when a later stage fails. Instead every entity
//! created during the run is journaled so an operator can remove partial
//! results by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::outcome::Outcome;
use crate::api::RemoteId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub stage: String,
    pub collection: String,
    pub id: RemoteId,
    /// Label of the record that produced the entity
    pub record: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationJournal {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub halted: bool,
    pub entries: Vec<JournalEntry>,
}

impl Default for CreationJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl CreationJournal {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            halted: false,
            entries: Vec::new(),
        }
    }

    /// Journal the outcome if it created an entity
    pub fn record(&mut self, stage: &str, collection: &str, label: &str, outcome: &Outcome) {
        if let Outcome::Created { id } = outcome {
            self.entries.push(JournalEntry {
                stage: stage.to_string(),
                collection: collection.to_string(),
                id: id.clone(),
                record: label.to_string(),
            });
        }
    }

    pub fn mark_halted(&mut self) {
        self.halted = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities created by one stage
    #[cfg(test)]
    pub fn created_in<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a JournalEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.stage == stage)
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    #[cfg(test)]
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::outcome::SkipReason;

    #[test]
    fn test_only_creations_are_journaled() {
        let mut journal = CreationJournal::new();
        journal.record("stores", "stores", "line 2", &Outcome::Created { id: RemoteId::from(4) });
        journal.record("stores", "stores", "line 3", &Outcome::Updated { id: RemoteId::from(5) });
        journal.record("stores", "stores", "line 4", &Outcome::Skipped(SkipReason::NoChanges));
        journal.record("stores", "stores", "line 5", &Outcome::failed("boom"));

        assert_eq!(journal.len(), 1);
        assert_eq!(journal.entries[0].id, RemoteId::from(4));
        assert_eq!(journal.created_in("stores").count(), 1);
        assert_eq!(journal.created_in("regions").count(), 0);
    }

    #[test]
    fn test_written_journal_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.json");

        let mut journal = CreationJournal::new();
        journal.record("regions", "regions", "line 2 (name=North)", &Outcome::Created { id: RemoteId::from(7) });
        journal.mark_halted();
        journal.write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"halted\": true"));
        assert_eq!(CreationJournal::read_from(&path).unwrap(), journal);
    }
}
