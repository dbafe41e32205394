use log::debug;
use std::collections::HashMap;

use crate::model::{
    EntityType, HasIdentity, Identity, MergeError, ParentLink, Payload, Record, RelationAccess,
    RelationDef, SchemaCatalog, StaleEntry,
};

/// Computes which children of an aggregate are orphaned by a payload.
///
/// Planning is pure: it reads catalog metadata and the two trees, and never
/// touches a store.
pub struct TreeMergePlanner<'a, K: SchemaCatalog + ?Sized> {
    catalog: &'a K,
}

impl<'a, K: SchemaCatalog + ?Sized> TreeMergePlanner<'a, K> {
    pub fn new(catalog: &'a K) -> Self {
        Self { catalog }
    }

    /// Collect every stale child, at any depth, into one flat list
    pub fn plan<C, P>(
        &self,
        entity_type: &EntityType,
        current: &C,
        payload: &P,
    ) -> Result<Vec<StaleEntry>, MergeError>
    where
        C: RelationAccess,
        P: RelationAccess,
    {
        let mut stale = Vec::new();
        plan_level(self.catalog, entity_type, current, payload, &mut stale)?;
        Ok(stale)
    }

    /// Detach the children `plan` would report from an owned record tree
    pub fn prune(
        &self,
        entity_type: &EntityType,
        record: &mut Record,
        payload: &Payload,
    ) -> Result<(), MergeError> {
        prune_level(self.catalog, entity_type, record, payload)
    }
}

/// A surviving child paired with the payload entry that matched it
#[derive(Debug)]
pub struct Continuation<'a, C, P> {
    pub entity_type: &'a EntityType,
    pub current: &'a C,
    pub payload: &'a P,
}

/// Diff of one relation slot: children to delete, and children to recurse into
#[derive(Debug)]
pub struct MergePlan<'a, C, P> {
    pub stale: Vec<StaleEntry>,
    pub continuations: Vec<Continuation<'a, C, P>>,
}

impl<'a, C: RelationAccess, P: RelationAccess> MergePlan<'a, C, P> {
    /// Returns `None` when the slot needs no work: the current record has no
    /// children there, or the payload omits the relation.
    pub fn for_relation<K: SchemaCatalog + ?Sized>(
        catalog: &K,
        entity_type: &EntityType,
        relation: &'a RelationDef,
        current: &'a C,
        payload: &'a P,
    ) -> Result<Option<Self>, MergeError> {
        let children = match current.relation(&relation.name) {
            Some(children) if !children.is_empty() => children,
            _ => return Ok(None),
        };
        // Omitted relation means "unchanged"; an empty list means "remove all"
        let Some(incoming) = payload.relation(&relation.name) else {
            return Ok(None);
        };

        // Children are only descended into after matching by identity, so
        // only the root can get here without one
        let parent_field = catalog.identity_field(entity_type)?;
        let parent_identity = current.identity(parent_field).ok_or_else(|| {
            MergeError::MissingRootIdentity {
                entity_type: entity_type.clone(),
                field: parent_field.to_string(),
            }
        })?;
        let parent = ParentLink::new(entity_type.clone(), parent_identity, &relation.name);

        let identity_field = catalog.identity_field(&relation.child_type)?;
        let by_identity = index_by_identity(incoming, identity_field);

        let mut plan = MergePlan {
            stale: Vec::new(),
            continuations: Vec::with_capacity(children.len()),
        };
        for child in children {
            let identity = require_identity(child, relation, identity_field)?;
            match by_identity.get(&identity) {
                Some(matched) => plan.continuations.push(Continuation {
                    entity_type: &relation.child_type,
                    current: child,
                    payload: *matched,
                }),
                None => plan.stale.push(StaleEntry::new(
                    relation.child_type.clone(),
                    identity,
                    parent.clone(),
                )),
            }
        }
        Ok(Some(plan))
    }
}

/// One level of the depth-first walk. All state is passed in explicitly.
pub fn plan_level<'a, K, C, P>(
    catalog: &'a K,
    entity_type: &EntityType,
    current: &'a C,
    payload: &'a P,
    stale: &mut Vec<StaleEntry>,
) -> Result<(), MergeError>
where
    K: SchemaCatalog + ?Sized,
    C: RelationAccess,
    P: RelationAccess,
{
    for relation in catalog.one_to_many_relations(entity_type)? {
        let Some(plan) =
            MergePlan::for_relation(catalog, entity_type, relation, current, payload)?
        else {
            continue;
        };

        if !plan.stale.is_empty() {
            debug!(
                "{} stale '{}' record(s) under {}.{}",
                plan.stale.len(),
                relation.child_type,
                entity_type,
                relation.name
            );
        }
        stale.extend(plan.stale);

        for next in plan.continuations {
            plan_level(catalog, next.entity_type, next.current, next.payload, stale)?;
        }
    }
    Ok(())
}

fn prune_level<K: SchemaCatalog + ?Sized>(
    catalog: &K,
    entity_type: &EntityType,
    record: &mut Record,
    payload: &Payload,
) -> Result<(), MergeError> {
    for relation in catalog.one_to_many_relations(entity_type)? {
        let Some(incoming) = payload.relation(&relation.name) else {
            continue;
        };
        let Some(children) = record.relations.get_mut(&relation.name) else {
            continue;
        };
        if children.is_empty() {
            continue;
        }

        let identity_field = catalog.identity_field(&relation.child_type)?;
        let by_identity = index_by_identity(incoming, identity_field);

        let mut kept = Vec::with_capacity(children.len());
        for mut child in std::mem::take(children) {
            let identity = require_identity(&child, relation, identity_field)?;
            if let Some(matched) = by_identity.get(&identity) {
                prune_level(catalog, &relation.child_type, &mut child, matched)?;
                kept.push(child);
            }
        }
        *children = kept;
    }
    Ok(())
}

/// First entry wins when the payload repeats an identity. Entries without an
/// identity are new children and never match.
fn index_by_identity<'a, P: HasIdentity>(
    items: &'a [P],
    identity_field: &str,
) -> HashMap<Identity, &'a P> {
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        if let Some(identity) = item.identity(identity_field) {
            index.entry(identity).or_insert(item);
        }
    }
    index
}

fn require_identity<C: HasIdentity>(
    child: &C,
    relation: &RelationDef,
    identity_field: &str,
) -> Result<Identity, MergeError> {
    child
        .identity(identity_field)
        .ok_or_else(|| MergeError::MissingIdentity {
            entity_type: relation.child_type.clone(),
            relation: relation.name.clone(),
            field: identity_field.to_string(),
        })
}
