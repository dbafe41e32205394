use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::error::StoreOperation;
use crate::model::{EntityType, Identity, Record};

/// Where a child record hangs in its aggregate: the owning record and the relation slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentLink {
    pub entity_type: EntityType,
    pub identity: Identity,
    pub relation: String,
}

impl ParentLink {
    pub fn new(entity_type: EntityType, identity: Identity, relation: &str) -> Self {
        Self {
            entity_type,
            identity,
            relation: relation.to_string(),
        }
    }
}

impl fmt::Display for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.entity_type, self.identity, self.relation)
    }
}

/// A child record scheduled for deletion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaleEntry {
    pub entity_type: EntityType,
    pub identity: Identity,
    /// Owner and slot the child was found under when the plan was made
    pub parent: ParentLink,
}

impl StaleEntry {
    pub fn new(entity_type: EntityType, identity: Identity, parent: ParentLink) -> Self {
        Self {
            entity_type,
            identity,
            parent,
        }
    }
}

/// A stale entry the executor could not delete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionFailure {
    pub entry: StaleEntry,
    pub operation: StoreOperation,
    pub error: String,
}

/// Result of one merge: the saved root plus what happened to every stale child
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub record: Record,
    pub stale: Vec<StaleEntry>,
    pub deleted: Vec<StaleEntry>,
    pub already_absent: Vec<StaleEntry>,
    pub failures: Vec<DeletionFailure>,
}

impl MergeOutcome {
    /// True when every stale entry is gone from the store
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a uniqueness check. A violation is data, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResult {
    pub violated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl ConflictResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn violated(fields: Vec<String>) -> Self {
        Self {
            violated: true,
            fields: Some(fields),
        }
    }
}
