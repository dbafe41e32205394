use anyhow::Result;
use serde_json::Value;

use crate::model::{EntityType, Identity, ParentLink, Record};

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record and its owned children
    async fn fetch_by_identity(
        &self,
        entity_type: &EntityType,
        identity: &Identity,
    ) -> Result<Option<Record>>;

    /// Upsert a record tree. Children missing from the tree are left in place.
    ///
    /// Records are addressed by entity type and identity, so a child already
    /// owned by a different parent is an error rather than a move.
    async fn save(&self, record: Record) -> Result<Record>;

    /// Owner of a stored child. `None` when the record is gone or is a root.
    async fn parent_of(
        &self,
        entity_type: &EntityType,
        identity: &Identity,
    ) -> Result<Option<ParentLink>>;

    /// Remove a record together with its children. Returns false if it was already gone.
    async fn remove(&self, record: &Record) -> Result<bool>;

    /// Every record of `entity_type` where at least one `(field, value)` pair matches
    async fn query_by_any_equals(
        &self,
        entity_type: &EntityType,
        predicates: &[(String, Value)],
    ) -> Result<Vec<Record>>;
}
