use anyhow::Result;
use itertools::Itertools;
use log::debug;
use serde_json::Value;

use crate::model::{
    ConflictResult, EntityType, Fields, HasIdentity, Identity, MergeError, Record, SchemaCatalog,
    StoreOperation,
};
use crate::store::traits::RecordStore;

/// Pre-write uniqueness check against stored rows, using one batched query
pub struct UniqueConstraintChecker<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> UniqueConstraintChecker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Report which of `unique_fields` already hold the payload's value in some stored record.
    ///
    /// The record being written is not excluded, so an update that keeps its
    /// own unique value conflicts with itself. Use [`Self::check_excluding`] for updates.
    pub async fn check(
        &self,
        entity_type: &EntityType,
        unique_fields: &[String],
        payload: &Fields,
    ) -> Result<ConflictResult> {
        self.run(entity_type, unique_fields, payload, None).await
    }

    /// Same as [`Self::check`], but rows whose identity equals `identity` are ignored
    pub async fn check_excluding(
        &self,
        entity_type: &EntityType,
        unique_fields: &[String],
        payload: &Fields,
        identity_field: &str,
        identity: &Identity,
    ) -> Result<ConflictResult> {
        self.run(
            entity_type,
            unique_fields,
            payload,
            Some((identity_field, identity)),
        )
        .await
    }

    /// Resolve the unique fields from the catalog, then check
    pub async fn check_entity<K: SchemaCatalog + ?Sized>(
        &self,
        catalog: &K,
        entity_type: &EntityType,
        payload: &Fields,
        exclude: Option<&Identity>,
    ) -> Result<ConflictResult, MergeError> {
        let unique_fields = catalog.unique_fields(entity_type)?;
        let result = match exclude {
            Some(identity) => {
                let identity_field = catalog.identity_field(entity_type)?;
                self.check_excluding(entity_type, &unique_fields, payload, identity_field, identity)
                    .await
            }
            None => self.check(entity_type, &unique_fields, payload).await,
        };

        result.map_err(|source| MergeError::Persistence {
            operation: StoreOperation::Query,
            entity_type: entity_type.clone(),
            identity: exclude.cloned(),
            source,
        })
    }

    async fn run(
        &self,
        entity_type: &EntityType,
        unique_fields: &[String],
        payload: &Fields,
        exclude: Option<(&str, &Identity)>,
    ) -> Result<ConflictResult> {
        if unique_fields.is_empty() {
            return Ok(ConflictResult::none());
        }

        // Only fields the payload actually sets take part in the check
        let predicates: Vec<(String, Value)> = unique_fields
            .iter()
            .filter_map(|field| {
                payload
                    .get(field)
                    .filter(|value| !is_blank(value))
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();
        if predicates.is_empty() {
            return Ok(ConflictResult::none());
        }

        let rows = self
            .store
            .query_by_any_equals(entity_type, &predicates)
            .await?;
        let rows: Vec<Record> = match exclude {
            Some((identity_field, identity)) => rows
                .into_iter()
                .filter(|row| row.identity(identity_field).as_ref() != Some(identity))
                .collect(),
            None => rows,
        };
        if rows.is_empty() {
            return Ok(ConflictResult::none());
        }

        let violated: Vec<String> = predicates
            .iter()
            .filter(|(field, value)| rows.iter().any(|row| row.fields.get(field) == Some(value)))
            .map(|(field, _)| field.clone())
            .collect();
        if violated.is_empty() {
            return Ok(ConflictResult::none());
        }

        debug!(
            "Unique conflict on '{}': {}",
            entity_type,
            violated.iter().join(", ")
        );
        Ok(ConflictResult::violated(violated))
    }
}

/// `null`, empty strings and empty collections are not checked
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
