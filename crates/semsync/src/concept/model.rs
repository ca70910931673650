use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Opaque identifier, unique within a sync scope.
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Relation type → ordered target ids. Targets need not exist.
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Concept {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            color: None,
            relationships: BTreeMap::new(),
            created_at: Utc::now(),
            deleted: false,
            deleted_at: None,
        }
    }

    /// Build a live concept from caller-supplied attributes.
    pub fn from_data(id: impl Into<String>, data: ConceptData, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: data.name,
            description: data.description,
            color: data.color,
            relationships: data.relationships,
            created_at,
            deleted: false,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Append `target` to the `relation` list.
    #[must_use]
    pub fn with_relationship(mut self, relation: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships
            .entry(relation.into())
            .or_default()
            .push(target.into());
        self
    }

    /// The deletion record for this concept: same content, marked deleted.
    #[must_use]
    pub fn tombstone(mut self, at: DateTime<Utc>) -> Self {
        self.deleted = true;
        self.deleted_at = Some(at);
        self
    }

    /// Attributes a caller may change, without identity or lifecycle fields.
    #[must_use]
    pub fn data(&self) -> ConceptData {
        ConceptData {
            name: self.name.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
            relationships: self.relationships.clone(),
        }
    }
}

/// Caller-supplied attributes for create and update (full replace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub relationships: BTreeMap<String, Vec<String>>,
}

impl ConceptData {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relation: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships
            .entry(relation.into())
            .or_default()
            .push(target.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    Create,
    Update,
    Delete,
}

impl CommitKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommitKind::Create => "create",
            CommitKind::Update => "update",
            CommitKind::Delete => "delete",
        }
    }
}

/// A local mutation waiting to be written to the remote.
///
/// `record` is the full record to write: the new state for create/update, the
/// tombstone for delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommit {
    pub kind: CommitKind,
    pub id: String,
    pub record: Concept,
    pub timestamp: DateTime<Utc>,
}

impl PendingCommit {
    pub fn new(kind: CommitKind, record: Concept) -> Self {
        Self {
            kind,
            id: record.id.clone(),
            record,
            timestamp: Utc::now(),
        }
    }
}
