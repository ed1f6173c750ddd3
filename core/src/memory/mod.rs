//! Persistent memory
//!
//! Two kinds of storage back the capabilities:
//! - [`MemoryStore`]: append-only records in SQLite, searchable by substring
//! - [`Namespace`]: flat files under the memory and script directories

pub mod namespace;
pub mod store;

pub use namespace::Namespace;
pub use store::{MemoryRecord, MemoryStore};

use std::path::Path;
use thiserror::Error;

/// Failure reading or writing persistent memory
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),

    #[error("path '{0}' is outside the namespace")]
    OutsideNamespace(String),

    #[error("could not generate a unique record id")]
    IdExhausted,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where `searchmemory` looks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    /// Every record in the store
    All,
    /// One flat file in the memory namespace, returned whole on a match
    File(String),
}

impl SearchScope {
    pub fn parse(scope: &str) -> Self {
        if scope == "ALL" {
            SearchScope::All
        } else {
            SearchScope::File(scope.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    /// Matching records, never empty
    Records(Vec<MemoryRecord>),
    /// Full content of a file containing the term
    File(String),
    FileNotFound(String),
    NoMatches,
}

/// Records plus the two flat-file namespaces, as seen by capabilities.
pub struct Memory {
    pub records: MemoryStore,
    pub memory_files: Namespace,
    pub script_files: Namespace,
}

impl Memory {
    pub fn open(database: &Path, memory_dir: &Path, script_dir: &Path) -> Result<Self, MemoryError> {
        Ok(Self {
            records: MemoryStore::open(database)?,
            memory_files: Namespace::new(memory_dir),
            script_files: Namespace::new(script_dir),
        })
    }

    /// Case-sensitive substring search over the records or one memory file.
    pub fn search(&self, scope: &SearchScope, term: &str) -> Result<SearchResult, MemoryError> {
        let result = match scope {
            SearchScope::All => {
                let records = self.records.search(term)?;
                if records.is_empty() {
                    SearchResult::NoMatches
                } else {
                    SearchResult::Records(records)
                }
            }
            SearchScope::File(name) => match self.memory_files.read(name)? {
                Some(content) if content.contains(term) => SearchResult::File(content),
                Some(_) => SearchResult::NoMatches,
                None => SearchResult::FileNotFound(name.clone()),
            },
        };
        Ok(result)
    }
}
