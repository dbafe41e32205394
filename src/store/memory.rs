use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::{EntityType, Fields, Identity, ParentLink, Record, SchemaCatalog};
use crate::store::rows::{claims_foreign_row, flatten, identity_of};
use crate::store::traits::RecordStore;

#[derive(Debug, Clone)]
struct StoredRow {
    fields: Fields,
    parent: Option<ParentLink>,
    position: usize,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<EntityType, BTreeMap<Identity, StoredRow>>,
    next_seq: u64,
}

/// Normalized in-memory store: one table per entity type, children linked to
/// their parent row and reassembled on read.
pub struct InMemoryStore {
    catalog: Arc<dyn SchemaCatalog>,
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self {
            catalog,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Number of stored rows of one entity type
    pub fn count(&self, entity_type: &EntityType) -> usize {
        self.tables
            .read()
            .rows
            .get(entity_type)
            .map_or(0, BTreeMap::len)
    }

    fn assemble(
        &self,
        tables: &Tables,
        entity_type: &EntityType,
        identity: &Identity,
    ) -> Result<Option<Record>> {
        let Some(row) = tables
            .rows
            .get(entity_type)
            .and_then(|table| table.get(identity))
        else {
            return Ok(None);
        };

        let mut record = Record::new(entity_type.clone(), row.fields.clone());
        for relation in self.catalog.one_to_many_relations(entity_type)? {
            let link = ParentLink {
                entity_type: entity_type.clone(),
                identity: identity.clone(),
                relation: relation.name.clone(),
            };
            let mut linked: Vec<(usize, u64, &Identity)> = tables
                .rows
                .get(&relation.child_type)
                .map(|table| {
                    table
                        .iter()
                        .filter(|(_, child)| child.parent.as_ref() == Some(&link))
                        .map(|(id, child)| (child.position, child.seq, id))
                        .collect()
                })
                .unwrap_or_default();
            linked.sort();

            let mut children = Vec::with_capacity(linked.len());
            for (_, _, child_identity) in linked {
                if let Some(child) = self.assemble(tables, &relation.child_type, child_identity)? {
                    children.push(child);
                }
            }
            record.relations.insert(relation.name.clone(), children);
        }
        Ok(Some(record))
    }

    fn collect_subtree(
        &self,
        tables: &Tables,
        entity_type: &EntityType,
        identity: &Identity,
        doomed: &mut Vec<(EntityType, Identity)>,
    ) -> Result<()> {
        doomed.push((entity_type.clone(), identity.clone()));
        for relation in self.catalog.one_to_many_relations(entity_type)? {
            let link = ParentLink {
                entity_type: entity_type.clone(),
                identity: identity.clone(),
                relation: relation.name.clone(),
            };
            let Some(table) = tables.rows.get(&relation.child_type) else {
                continue;
            };
            for (child_identity, child) in table {
                if child.parent.as_ref() == Some(&link) {
                    self.collect_subtree(tables, &relation.child_type, child_identity, doomed)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryStore {
    async fn fetch_by_identity(
        &self,
        entity_type: &EntityType,
        identity: &Identity,
    ) -> Result<Option<Record>> {
        let tables = self.tables.read();
        self.assemble(&tables, entity_type, identity)
    }

    async fn save(&self, record: Record) -> Result<Record> {
        let rows = flatten(self.catalog.as_ref(), &record)?;
        let root_identity = rows[0].identity.clone();

        let mut guard = self.tables.write();
        let tables = &mut *guard;

        // Validate every row before touching any of them
        for row in &rows {
            let stored = tables
                .rows
                .get(&row.entity_type)
                .and_then(|table| table.get(&row.identity));
            if let Some(stored) = stored {
                if claims_foreign_row(stored.parent.as_ref(), row.parent.as_ref()) {
                    bail!(
                        "'{}' {} already belongs to {}",
                        row.entity_type,
                        row.identity,
                        stored
                            .parent
                            .as_ref()
                            .map_or_else(String::new, ToString::to_string)
                    );
                }
            }
        }

        for row in rows {
            let seq = tables.next_seq;
            let table = tables.rows.entry(row.entity_type).or_default();
            match table.get_mut(&row.identity) {
                Some(existing) => {
                    existing.fields = row.fields;
                    // A root save does not detach the row from its own parent
                    if row.parent.is_some() {
                        existing.parent = row.parent;
                        existing.position = row.position;
                    }
                }
                None => {
                    table.insert(
                        row.identity,
                        StoredRow {
                            fields: row.fields,
                            parent: row.parent,
                            position: row.position,
                            seq,
                        },
                    );
                    tables.next_seq += 1;
                }
            }
        }

        self.assemble(tables, &record.entity_type, &root_identity)?
            .ok_or_else(|| anyhow!("saved '{}' {} vanished", record.entity_type, root_identity))
    }

    async fn parent_of(
        &self,
        entity_type: &EntityType,
        identity: &Identity,
    ) -> Result<Option<ParentLink>> {
        let tables = self.tables.read();
        Ok(tables
            .rows
            .get(entity_type)
            .and_then(|table| table.get(identity))
            .and_then(|row| row.parent.clone()))
    }

    async fn remove(&self, record: &Record) -> Result<bool> {
        let identity = identity_of(self.catalog.as_ref(), record)?;

        let mut tables = self.tables.write();
        let exists = tables
            .rows
            .get(&record.entity_type)
            .is_some_and(|table| table.contains_key(&identity));
        if !exists {
            return Ok(false);
        }

        let mut doomed = Vec::new();
        self.collect_subtree(&tables, &record.entity_type, &identity, &mut doomed)?;
        for (entity_type, identity) in doomed {
            if let Some(table) = tables.rows.get_mut(&entity_type) {
                table.remove(&identity);
            }
        }
        Ok(true)
    }

    async fn query_by_any_equals(
        &self,
        entity_type: &EntityType,
        predicates: &[(String, Value)],
    ) -> Result<Vec<Record>> {
        let tables = self.tables.read();
        let Some(table) = tables.rows.get(entity_type) else {
            return Ok(Vec::new());
        };

        let mut matches = Vec::new();
        for (identity, row) in table {
            let hit = predicates
                .iter()
                .any(|(field, value)| row.fields.get(field) == Some(value));
            if hit {
                if let Some(record) = self.assemble(&tables, entity_type, identity)? {
                    matches.push(record);
                }
            }
        }
        Ok(matches)
    }
}
