use anyhow::{anyhow, bail, Result};
use std::collections::HashSet;

use crate::model::{EntityType, Fields, HasIdentity, Identity, ParentLink, Record, SchemaCatalog};

/// One node of a record tree, detached from its children
#[derive(Debug, Clone)]
pub struct FlatRow {
    pub entity_type: EntityType,
    pub identity: Identity,
    pub fields: Fields,
    pub parent: Option<ParentLink>,
    pub position: usize,
}

/// Flatten a tree into rows, parents before children. Every node is validated
/// against the catalog before anything is returned, so callers can write the
/// rows without leaving half a tree behind on bad input.
///
/// Stores address rows by entity type and identity, so one tree may not hold
/// the same record twice.
pub fn flatten<K: SchemaCatalog + ?Sized>(catalog: &K, record: &Record) -> Result<Vec<FlatRow>> {
    let mut rows = Vec::new();
    flatten_into(catalog, record, None, 0, &mut rows)?;

    let mut seen = HashSet::with_capacity(rows.len());
    for row in &rows {
        if !seen.insert((&row.entity_type, &row.identity)) {
            bail!(
                "'{}' {} appears more than once in the '{}' tree",
                row.entity_type,
                row.identity,
                record.entity_type
            );
        }
    }
    Ok(rows)
}

/// A child row already owned by one parent may not be claimed by another.
/// Root saves and rows without an owner never conflict.
pub fn claims_foreign_row(stored: Option<&ParentLink>, incoming: Option<&ParentLink>) -> bool {
    matches!((stored, incoming), (Some(stored), Some(incoming)) if stored != incoming)
}

fn flatten_into<K: SchemaCatalog + ?Sized>(
    catalog: &K,
    record: &Record,
    parent: Option<ParentLink>,
    position: usize,
    rows: &mut Vec<FlatRow>,
) -> Result<()> {
    let identity = identity_of(catalog, record)?;
    rows.push(FlatRow {
        entity_type: record.entity_type.clone(),
        identity: identity.clone(),
        fields: record.fields.clone(),
        parent,
        position,
    });

    let declared = catalog.one_to_many_relations(&record.entity_type)?;
    for (name, children) in &record.relations {
        let relation = declared
            .iter()
            .find(|r| &r.name == name)
            .ok_or_else(|| {
                anyhow!(
                    "relation '{}' is not declared on '{}'",
                    name,
                    record.entity_type
                )
            })?;
        for (index, child) in children.iter().enumerate() {
            if child.entity_type != relation.child_type {
                bail!(
                    "relation '{}' on '{}' holds '{}' records, got '{}'",
                    name,
                    record.entity_type,
                    relation.child_type,
                    child.entity_type
                );
            }
            let link = ParentLink::new(record.entity_type.clone(), identity.clone(), name);
            flatten_into(catalog, child, Some(link), index, rows)?;
        }
    }
    Ok(())
}

pub fn identity_of<K: SchemaCatalog + ?Sized>(catalog: &K, record: &Record) -> Result<Identity> {
    let field = catalog.identity_field(&record.entity_type)?;
    record.identity(field).ok_or_else(|| {
        anyhow!(
            "'{}' record has no usable identity in field '{}'",
            record.entity_type,
            field
        )
    })
}
