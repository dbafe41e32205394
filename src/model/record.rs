use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::catalog::{EntityType, SchemaCatalog};
use crate::model::error::ShapeError;
use crate::model::identity::Identity;

/// Scalar fields of a record or payload, keyed by field name
pub type Fields = Map<String, Value>;

/// Field access plus identity lookup
pub trait HasIdentity {
    fn field(&self, name: &str) -> Option<&Value>;

    fn identity(&self, identity_field: &str) -> Option<Identity> {
        self.field(identity_field).and_then(Identity::from_value)
    }
}

/// Name-indexed access to one-to-many relations.
///
/// `None` means the relation slot is absent, `Some(&[])` means it is present and empty.
pub trait RelationAccess: HasIdentity + Sized {
    fn relation(&self, name: &str) -> Option<&[Self]>;
}

/// A stored record and its owned children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub entity_type: EntityType,
    pub fields: Fields,
    pub relations: BTreeMap<String, Vec<Record>>,
}

impl Record {
    pub fn new(entity_type: EntityType, fields: Fields) -> Self {
        Self {
            entity_type,
            fields,
            relations: BTreeMap::new(),
        }
    }

    /// Build a record tree from a JSON object, using the catalog to tell
    /// relations apart from scalar fields.
    pub fn from_json<K: SchemaCatalog + ?Sized>(
        catalog: &K,
        entity_type: &EntityType,
        value: Value,
    ) -> Result<Self, ShapeError> {
        let (fields, relations) = split_object(catalog, entity_type, value)?;
        let mut parsed = BTreeMap::new();
        for (name, (child_type, items)) in relations {
            let children = items
                .into_iter()
                .map(|item| Record::from_json(catalog, &child_type, item))
                .collect::<Result<Vec<_>, _>>()?;
            parsed.insert(name, children);
        }
        Ok(Self {
            entity_type: entity_type.clone(),
            fields,
            relations: parsed,
        })
    }

    /// Flatten back into a single JSON object
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        for (name, children) in &self.relations {
            object.insert(
                name.clone(),
                Value::Array(children.iter().map(Record::to_json).collect()),
            );
        }
        Value::Object(object)
    }

    /// Copy every scalar field of the payload onto this record. Relations are left alone.
    pub fn merge_scalars(&mut self, payload: &Payload) {
        for (name, value) in &payload.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

impl HasIdentity for Record {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl RelationAccess for Record {
    fn relation(&self, name: &str) -> Option<&[Record]> {
        self.relations.get(name).map(Vec::as_slice)
    }
}

/// Partial representation of a record. Omitted fields and relations are left unchanged by a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload {
    pub fields: Fields,
    pub relations: BTreeMap<String, Vec<Payload>>,
}

impl Payload {
    pub fn from_json<K: SchemaCatalog + ?Sized>(
        catalog: &K,
        entity_type: &EntityType,
        value: Value,
    ) -> Result<Self, ShapeError> {
        let (fields, relations) = split_object(catalog, entity_type, value)?;
        let mut parsed = BTreeMap::new();
        for (name, (child_type, items)) in relations {
            let children = items
                .into_iter()
                .map(|item| Payload::from_json(catalog, &child_type, item))
                .collect::<Result<Vec<_>, _>>()?;
            parsed.insert(name, children);
        }
        Ok(Self {
            fields,
            relations: parsed,
        })
    }
}

impl HasIdentity for Payload {
    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl RelationAccess for Payload {
    fn relation(&self, name: &str) -> Option<&[Payload]> {
        self.relations.get(name).map(Vec::as_slice)
    }
}

type SplitRelations = BTreeMap<String, (EntityType, Vec<Value>)>;

fn split_object<K: SchemaCatalog + ?Sized>(
    catalog: &K,
    entity_type: &EntityType,
    value: Value,
) -> Result<(Fields, SplitRelations), ShapeError> {
    let Value::Object(object) = value else {
        return Err(ShapeError::NotAnObject(entity_type.clone()));
    };

    let declared = catalog.one_to_many_relations(entity_type)?;
    let mut fields = Fields::new();
    let mut relations = BTreeMap::new();
    for (key, value) in object {
        match declared.iter().find(|r| r.name == key) {
            Some(relation) => match value {
                Value::Array(items) => {
                    relations.insert(key, (relation.child_type.clone(), items));
                }
                // null reads as "relation omitted"
                Value::Null => {}
                _ => {
                    return Err(ShapeError::RelationNotArray {
                        entity_type: entity_type.clone(),
                        relation: key,
                    })
                }
            },
            None => {
                fields.insert(key, value);
            }
        }
    }
    Ok((fields, relations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::order_catalog;
    use serde_json::json;

    #[test]
    fn test_payload_splits_relations_from_fields() {
        let catalog = order_catalog();
        let payload = Payload::from_json(
            &catalog,
            &EntityType::from("order"),
            json!({
                "id": 1,
                "status": "open",
                "tags": ["rush"],
                "lines": [{"id": 10, "notes": [{"id": 100, "text": "fragile"}]}]
            }),
        )
        .unwrap();

        assert_eq!(payload.fields.len(), 3);
        assert_eq!(payload.fields["tags"], json!(["rush"]));
        let lines = payload.relation("lines").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].identity("id"), Some(Identity::Int(10)));
        assert_eq!(lines[0].relation("notes").unwrap().len(), 1);
        assert!(payload.relation("shipments").is_none());
    }

    #[test]
    fn test_null_relation_reads_as_omitted() {
        let catalog = order_catalog();
        let payload = Payload::from_json(
            &catalog,
            &EntityType::from("order"),
            json!({"id": 1, "lines": null}),
        )
        .unwrap();
        assert!(payload.relation("lines").is_none());
    }

    #[test]
    fn test_shape_errors() {
        let catalog = order_catalog();
        let order = EntityType::from("order");

        let err = Payload::from_json(&catalog, &order, json!([1, 2])).unwrap_err();
        assert_eq!(err, ShapeError::NotAnObject(order.clone()));

        let err = Payload::from_json(&catalog, &order, json!({"lines": {"id": 1}})).unwrap_err();
        assert!(matches!(err, ShapeError::RelationNotArray { .. }));

        let err =
            Record::from_json(&catalog, &EntityType::from("ghost"), json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ShapeError::Catalog(_)));
    }

    #[test]
    fn test_record_json_round_trip_keeps_tree() {
        let catalog = order_catalog();
        let value = json!({
            "id": 1,
            "status": "open",
            "lines": [{"id": 10, "sku": "A", "notes": []}],
            "shipments": []
        });
        let record =
            Record::from_json(&catalog, &EntityType::from("order"), value.clone()).unwrap();
        assert_eq!(
            record.relation("lines").unwrap()[0].entity_type,
            EntityType::from("order_line")
        );
        assert_eq!(record.to_json(), value);
    }

    #[test]
    fn test_merge_scalars_leaves_relations() {
        let catalog = order_catalog();
        let order = EntityType::from("order");
        let mut record = Record::from_json(
            &catalog,
            &order,
            json!({"id": 1, "status": "open", "total": 5, "lines": [{"id": 10}]}),
        )
        .unwrap();
        let payload =
            Payload::from_json(&catalog, &order, json!({"status": "closed", "lines": []})).unwrap();

        record.merge_scalars(&payload);
        assert_eq!(record.fields["status"], json!("closed"));
        assert_eq!(record.fields["total"], json!(5));
        assert_eq!(record.relation("lines").unwrap().len(), 1);
    }
}
