//! Code tables: per-ABI mappings from raw enumeration values to labels.
//!
//! A [Codes] set is built once for a hardware ABI revision and handed to the
//! map; code fields keep a shared handle to the table they decode with.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::DefinitionError;

/// Immutable mapping from a raw code to its human-readable label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    labels: HashMap<u64, String>,
}

impl CodeTable {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        CodeTable {
            labels: entries
                .into_iter()
                .map(|(code, label)| (code, label.into()))
                .collect(),
        }
    }

    /// Label for `code`, if the table knows it.
    pub fn label(&self, code: u64) -> Option<&str> {
        self.labels.get(&code).map(String::as_str)
    }

    /// Reverse lookup of a label. Picks the lowest code when a label repeats.
    pub fn code(&self, label: &str) -> Option<u64> {
        self.labels
            .iter()
            .filter(|(_, l)| l.as_str() == label)
            .map(|(code, _)| *code)
            .min()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Named code tables for one ABI revision.
#[derive(Debug, Clone, Default)]
pub struct Codes {
    tables: HashMap<String, Arc<CodeTable>>,
}

impl Codes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table under `name`.
    pub fn with_table(mut self, name: impl Into<String>, table: CodeTable) -> Self {
        self.tables.insert(name.into(), Arc::new(table));
        self
    }

    /// Shared handle to the table called `name`.
    pub fn table(&self, name: &str) -> Result<Arc<CodeTable>, DefinitionError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| DefinitionError::UnknownCodeTable(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
