//! Input records and natural keys

use std::collections::HashMap;
use std::fmt;

/// One row of input, keyed by header name
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    line: u64,
    fields: HashMap<String, String>,
}

impl Record {
    pub fn new(line: u64, fields: HashMap<String, String>) -> Self {
        Self { line, fields }
    }

    /// 1-based line of the row in its source file
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Raw cell content, as read
    pub fn raw(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Trimmed cell content; `None` when the column is absent or blank
    pub fn value(&self, column: &str) -> Option<&str> {
        self.raw(column)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Normalized lookup key: trimmed, inner whitespace collapsed, lower-cased
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn new(raw: &str) -> Self {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        NaturalKey(collapsed.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        Record::new(
            2,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_value_trims_and_hides_blanks() {
        let record = record(&[("name", "  Widget "), ("color", "   ")]);

        assert_eq!(record.value("name"), Some("Widget"));
        assert_eq!(record.raw("color"), Some("   "));
        assert_eq!(record.value("color"), None);
        assert_eq!(record.value("missing"), None);
    }

    #[test]
    fn test_natural_key_normalization() {
        assert_eq!(NaturalKey::new("  North   Region "), NaturalKey::new("north region"));
        assert_eq!(NaturalKey::new("ÉTÉ").to_string(), "été");
        assert!(NaturalKey::new("   ").is_empty());
    }
}
