//! INI-style document parsing for ITL results files.
//!
//! ITL writes its per-test summaries as `[Section]` / `Key = Value`
//! text. Option keys are matched case-insensitively and stored
//! lower-cased; section names are matched exactly. Values are kept as
//! raw strings since many rows are whitespace-separated tables rather
//! than scalars.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors raised while reading an INI document.
#[derive(Debug, Error)]
pub enum IniError {
    #[error("line {line}: `{text}` is outside any section")]
    OrphanLine { line: usize, text: String },
    #[error("line {line}: `{text}` is not a key/value pair")]
    BadLine { line: usize, text: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One `[Section]` of key/value pairs, in file order.
#[derive(Debug, Clone, Default)]
pub struct Section {
    items: Vec<(String, String)>,
}

impl Section {
    /// Looks up a value by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.items
            .iter()
            .find_map(|(k, v)| (*k == key).then_some(v.as_str()))
    }

    /// The (lower-cased key, value) pairs in file order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed INI document.
#[derive(Debug, Clone, Default)]
pub struct IniDocument {
    sections: Vec<(String, Section)>,
}

impl IniDocument {
    /// Reads and parses a document from disk.
    pub fn open(path: &Path) -> Result<Self, IniError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parses a document from text.
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let mut doc = IniDocument::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                doc.sections.push((name.trim().to_string(), Section::default()));
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| IniError::BadLine {
                    line: lineno + 1,
                    text: line.to_string(),
                })?;
            let section = doc
                .sections
                .last_mut()
                .ok_or_else(|| IniError::OrphanLine {
                    line: lineno + 1,
                    text: line.to_string(),
                })?;
            section
                .1
                .items
                .push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
        Ok(doc)
    }

    /// Looks up a section by exact name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find_map(|(n, s)| (n == name).then_some(s))
    }
}
