use futures_util::future::join_all;
use log::{debug, info, warn};

use crate::logic::planner::TreeMergePlanner;
use crate::model::{
    DeletionFailure, HasIdentity, Identity, MergeError, MergeOutcome, Payload, Record,
    SchemaCatalog, StaleEntry, StoreOperation,
};
use crate::store::traits::RecordStore;

/// What happened to one stale entry
enum Deletion {
    Deleted(StaleEntry),
    AlreadyAbsent(StaleEntry),
    Failed(DeletionFailure),
}

/// Replaces an aggregate with a payload and prunes the children it dropped
pub struct MergeExecutor<'a, S: RecordStore + ?Sized, K: SchemaCatalog + ?Sized> {
    store: &'a S,
    catalog: &'a K,
}

impl<'a, S: RecordStore + ?Sized, K: SchemaCatalog + ?Sized> MergeExecutor<'a, S, K> {
    pub fn new(store: &'a S, catalog: &'a K) -> Self {
        Self { store, catalog }
    }

    /// Merge `payload` into `current`, save the root, then delete every stale child.
    ///
    /// Errors returned here happened before any deletion was attempted. Deletion
    /// failures are collected in [`MergeOutcome::failures`]; the saved root is
    /// never rolled back.
    pub async fn execute(
        &self,
        current: Record,
        payload: &Payload,
    ) -> Result<MergeOutcome, MergeError> {
        let entity_type = current.entity_type.clone();
        let planner = TreeMergePlanner::new(self.catalog);

        // Planning must see the pre-merge tree
        let stale = planner.plan(&entity_type, &current, payload)?;

        let identity_field = self.catalog.identity_field(&entity_type)?;
        let identity = root_identity(&current, identity_field)?;
        if let Some(requested) = payload.fields.get(identity_field) {
            if Identity::from_value(requested).as_ref() != Some(&identity) {
                return Err(MergeError::IdentityChanged {
                    entity_type,
                    current: identity,
                    requested: requested.clone(),
                });
            }
        }

        let mut merged = current;
        merged.merge_scalars(payload);
        planner.prune(&entity_type, &mut merged, payload)?;

        let mut saved = self
            .store
            .save(merged)
            .await
            .map_err(|source| MergeError::Persistence {
                operation: StoreOperation::Save,
                entity_type: entity_type.clone(),
                identity: Some(identity.clone()),
                source,
            })?;
        debug!("Saved '{}' {}", entity_type, identity);
        // Stale rows are still stored until the deletions below run
        planner.prune(&entity_type, &mut saved, payload)?;

        let results =
            join_all(stale.iter().cloned().map(|entry| self.delete_stale(entry))).await;

        let mut outcome = MergeOutcome {
            record: saved,
            stale,
            deleted: Vec::new(),
            already_absent: Vec::new(),
            failures: Vec::new(),
        };
        for result in results {
            match result {
                Deletion::Deleted(entry) => outcome.deleted.push(entry),
                Deletion::AlreadyAbsent(entry) => outcome.already_absent.push(entry),
                Deletion::Failed(failure) => {
                    warn!(
                        "Could not {} stale '{}' {}: {}",
                        failure.operation,
                        failure.entry.entity_type,
                        failure.entry.identity,
                        failure.error
                    );
                    outcome.failures.push(failure);
                }
            }
        }

        info!(
            "Merged '{}' {}: {} stale, {} deleted, {} already absent, {} failed",
            entity_type,
            identity,
            outcome.stale.len(),
            outcome.deleted.len(),
            outcome.already_absent.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Re-fetch before removing, so rows removed or re-parented by someone else count as done
    async fn delete_stale(&self, entry: StaleEntry) -> Deletion {
        match self
            .store
            .parent_of(&entry.entity_type, &entry.identity)
            .await
        {
            Ok(Some(parent)) if parent == entry.parent => {}
            Ok(Some(parent)) => {
                debug!(
                    "Stale '{}' {} now belongs to {}, leaving it",
                    entry.entity_type, entry.identity, parent
                );
                return Deletion::AlreadyAbsent(entry);
            }
            Ok(None) => return Deletion::AlreadyAbsent(entry),
            Err(e) => {
                return Deletion::Failed(DeletionFailure {
                    entry,
                    operation: StoreOperation::Fetch,
                    error: format!("{:#}", e),
                })
            }
        }

        let record = match self
            .store
            .fetch_by_identity(&entry.entity_type, &entry.identity)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return Deletion::AlreadyAbsent(entry),
            Err(e) => {
                return Deletion::Failed(DeletionFailure {
                    entry,
                    operation: StoreOperation::Fetch,
                    error: format!("{:#}", e),
                })
            }
        };

        match self.store.remove(&record).await {
            Ok(true) => Deletion::Deleted(entry),
            Ok(false) => Deletion::AlreadyAbsent(entry),
            Err(e) => Deletion::Failed(DeletionFailure {
                entry,
                operation: StoreOperation::Remove,
                error: format!("{:#}", e),
            }),
        }
    }
}

fn root_identity(record: &Record, identity_field: &str) -> Result<Identity, MergeError> {
    record
        .identity(identity_field)
        .ok_or_else(|| MergeError::MissingRootIdentity {
            entity_type: record.entity_type.clone(),
            field: identity_field.to_string(),
        })
}
