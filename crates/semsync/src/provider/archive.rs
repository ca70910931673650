use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::encoding::{decode_content, encode_content};
use super::errors::{ProviderError, Result};

/// Full snapshot of a semantic space, used for backups and provider migration.
///
/// Paths are relative to the space's base path, so an archive exported from one
/// provider imports cleanly into another with a different base path. Content is
/// stored base64-encoded to keep the JSON form lossless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphArchive {
    /// Name of the provider the archive was exported from.
    pub source: String,
    pub exported_at: DateTime<Utc>,
    pub files: BTreeMap<String, String>,
}

impl GraphArchive {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            exported_at: Utc::now(),
            files: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, path: impl Into<String>, content: &[u8]) {
        self.files.insert(path.into(), encode_content(content));
    }

    /// Decoded content at `path`.
    pub fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.files.get(path).map(|c| decode_content(c)).transpose()
    }

    /// Iterate over `(path, content)` pairs in path order.
    pub fn entries(&self) -> impl Iterator<Item = Result<(&str, Vec<u8>)>> + '_ {
        self.files
            .iter()
            .map(|(path, encoded)| decode_content(encoded).map(|c| (path.as_str(), c)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ProviderError::internal(format!("failed to serialize archive: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ProviderError::parse(format!("invalid archive: {e}")))
    }
}
