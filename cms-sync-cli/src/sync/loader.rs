//! Tabular loader
//!
//! Reads a CSV file into [`Record`]s, one per non-blank row, lazily. The
//! first row is the header; a UTF-8 byte-order mark in front of it is dropped.

use csv::{ReaderBuilder, StringRecordsIntoIter};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::record::Record;

const BOM: char = '\u{feff}';

/// The input could not be read as a table
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: missing header row", .path.display())]
    MissingHeader { path: PathBuf },
    #[error("{}:{line}: {message}", .path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

/// Lazy, single-pass iterator over the records of one file
pub struct RecordReader<R: Read> {
    path: PathBuf,
    headers: Vec<String>,
    rows: StringRecordsIntoIter<R>,
}

impl RecordReader<File> {
    pub fn open(path: &Path) -> Result<Self, LoaderError> {
        let file = File::open(path).map_err(|source| LoaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, path)
    }
}

impl<R: Read> RecordReader<R> {
    pub fn from_reader(reader: R, path: impl Into<PathBuf>) -> Result<Self, LoaderError> {
        let path = path.into();
        let mut csv = ReaderBuilder::new()
            .has_headers(true)
            // Column counts are checked per row, after blank rows are dropped
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv
            .headers()
            .map_err(|e| malformed(&path, &e))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches(BOM) } else { h };
                h.trim().to_string()
            })
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(LoaderError::MissingHeader { path });
        }

        Ok(Self {
            path,
            headers,
            rows: csv.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(malformed(&self.path, &e))),
            };

            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }

            let line = row.position().map_or(0, |p| p.line());
            if row.len() != self.headers.len() {
                return Some(Err(LoaderError::Malformed {
                    path: self.path.clone(),
                    line,
                    message: format!(
                        "expected {} columns, found {} (unbalanced quotes?)",
                        self.headers.len(),
                        row.len()
                    ),
                }));
            }

            let fields: HashMap<String, String> = self
                .headers
                .iter()
                .zip(row.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), cell.to_string()))
                .collect();

            return Some(Ok(Record::new(line, fields)));
        }
    }
}

fn malformed(path: &Path, err: &csv::Error) -> LoaderError {
    LoaderError::Malformed {
        path: path.to_path_buf(),
        line: err.position().map_or(0, |p| p.line()),
        message: err.to_string(),
    }
}
