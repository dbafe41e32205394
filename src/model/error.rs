use serde::Serialize;
use std::fmt;

use crate::model::{EntityType, Identity};

/// Catalog metadata could not be resolved. Always fatal and always raised
/// before anything is written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(EntityType),
    #[error("entity type '{0}' is declared more than once")]
    DuplicateEntityType(EntityType),
    #[error("entity type '{0}' has an empty identity field")]
    EmptyIdentityField(EntityType),
    #[error("relation '{relation}' on '{entity_type}' points at undeclared type '{child_type}'")]
    UnresolvedRelation {
        entity_type: EntityType,
        relation: String,
        child_type: EntityType,
    },
    #[error("relation graph is cyclic: {0}")]
    CyclicRelation(String),
}

/// A JSON document does not have the shape the catalog expects
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("expected a JSON object for '{0}'")]
    NotAnObject(EntityType),
    #[error("relation '{relation}' on '{entity_type}' must be an array")]
    RelationNotArray {
        entity_type: EntityType,
        relation: String,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    Fetch,
    Save,
    Remove,
    Query,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Fetch => "fetch",
            StoreOperation::Save => "save",
            StoreOperation::Remove => "remove",
            StoreOperation::Query => "query",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] CatalogError),

    #[error(
        "'{entity_type}' record in relation '{relation}' has no usable identity in field '{field}'"
    )]
    MissingIdentity {
        entity_type: EntityType,
        relation: String,
        field: String,
    },

    #[error("'{entity_type}' root record has no usable identity in field '{field}'")]
    MissingRootIdentity { entity_type: EntityType, field: String },

    #[error("payload changes the identity of '{entity_type}' from {current} to {requested}")]
    IdentityChanged {
        entity_type: EntityType,
        current: Identity,
        requested: serde_json::Value,
    },

    #[error("failed to {operation} '{entity_type}': {source:#}")]
    Persistence {
        operation: StoreOperation,
        entity_type: EntityType,
        identity: Option<Identity>,
        #[source]
        source: anyhow::Error,
    },
}

impl MergeError {
    /// True for errors raised before anything was written
    pub fn is_pre_write(&self) -> bool {
        !matches!(self, MergeError::Persistence { .. })
    }
}
