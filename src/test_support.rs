//! Shared fixtures for unit tests

use serde_json::{json, Value};

use crate::model::{EntityDescriptor, EntityType, Payload, Record, StaticCatalog};

/// order -> lines -> notes, order -> shipments, plus a standalone customer type
pub fn order_catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        EntityDescriptor::new("order")
            .with_relation("lines", "order_line")
            .with_relation("shipments", "shipment")
            .with_unique(&["number"]),
        EntityDescriptor::new("order_line").with_relation("notes", "line_note"),
        EntityDescriptor::new("line_note"),
        EntityDescriptor::new("shipment").with_identity_field("tracking_no"),
        EntityDescriptor::new("customer")
            .with_unique(&["email"])
            .with_unique(&["handle"]),
    ])
    .unwrap()
}

pub fn order_record(value: Value) -> Record {
    Record::from_json(&order_catalog(), &EntityType::from("order"), value).unwrap()
}

pub fn order_payload(value: Value) -> Payload {
    Payload::from_json(&order_catalog(), &EntityType::from("order"), value).unwrap()
}

/// Order 1 with lines 1..=3, each line carrying two notes
pub fn sample_order() -> Record {
    order_record(json!({
        "id": 1,
        "number": "SO-1",
        "status": "open",
        "lines": [
            {"id": 1, "sku": "A", "notes": [{"id": 11, "text": "a"}, {"id": 12, "text": "b"}]},
            {"id": 2, "sku": "B", "notes": [{"id": 21, "text": "c"}, {"id": 22, "text": "d"}]},
            {"id": 3, "sku": "C", "notes": [{"id": 31, "text": "e"}, {"id": 32, "text": "f"}]}
        ],
        "shipments": [{"tracking_no": "TRK-1", "carrier": "post"}]
    }))
}
