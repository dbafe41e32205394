use aggregate_merge::{
    app, EntityDescriptor, EntityType, InMemoryStore, Record, RecordStore, SchemaCatalog,
    StaticCatalog,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }
}

fn catalog() -> Arc<dyn SchemaCatalog> {
    let descriptors: Vec<EntityDescriptor> = serde_json::from_value(json!([
        {
            "entity_type": "order",
            "relations": [{"name": "lines", "child_type": "order_line"}],
            "unique": [["number"]]
        },
        {
            "entity_type": "order_line",
            "relations": [{"name": "notes", "child_type": "line_note"}]
        },
        {"entity_type": "line_note"},
        {"entity_type": "customer", "unique": [["email"]]}
    ]))
    .unwrap();
    Arc::new(StaticCatalog::new(descriptors).unwrap())
}

/// Serve a seeded in-memory store on an ephemeral port
async fn start_server() -> TestClient {
    let catalog = catalog();
    let store = InMemoryStore::new(catalog.clone());

    let order = Record::from_json(
        catalog.as_ref(),
        &EntityType::from("order"),
        json!({
            "id": 1,
            "number": "SO-1",
            "status": "open",
            "lines": [
                {"id": 1, "sku": "A", "notes": [{"id": 11}, {"id": 12}]},
                {"id": 2, "sku": "B", "notes": [{"id": 21}]},
                {"id": 3, "sku": "C"}
            ]
        }),
    )
    .unwrap();
    store.save(order).await.unwrap();
    for (id, email) in [(1, "a@x.com"), (2, "b@x.com")] {
        let customer = Record::from_json(
            catalog.as_ref(),
            &EntityType::from("customer"),
            json!({"id": id, "email": email}),
        )
        .unwrap();
        store.save(customer).await.unwrap();
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let router = app(store, catalog);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestClient::new(format!("http://{}", address))
}

#[tokio::test]
async fn test_health() {
    let client = start_server().await;

    let response = client.get("/health").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_get_record_returns_tree() {
    let client = start_server().await;

    let response = client.get("/entities/order/1").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["number"], "SO-1");
    assert_eq!(body["lines"].as_array().unwrap().len(), 3);
    assert_eq!(body["lines"][0]["notes"].as_array().unwrap().len(), 2);

    let missing = client.get("/entities/order/99").await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown = client.get("/entities/invoice/1").await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_deletes_dropped_children() {
    let client = start_server().await;

    let response = client
        .put(
            "/entities/order/1",
            json!({
                "status": "shipped",
                "lines": [{"id": 1, "notes": [{"id": 11}]}, {"id": 3}]
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = response.json().await.unwrap();
    // line 2 and note 12
    assert_eq!(outcome["stale"].as_array().unwrap().len(), 2);
    assert_eq!(outcome["deleted"].as_array().unwrap().len(), 2);
    assert!(outcome["failures"].as_array().unwrap().is_empty());

    let body: Value = client
        .get("/entities/order/1")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "shipped");
    let lines = body["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["notes"].as_array().unwrap().len(), 1);

    let gone = client.get("/entities/order_line/2").await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    let gone = client.get("/entities/line_note/21").await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_rejects_bad_requests() {
    let client = start_server().await;

    let changed = client
        .put("/entities/order/1", json!({"id": 2}))
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::BAD_REQUEST);

    let not_array = client
        .put("/entities/order/1", json!({"lines": {"id": 1}}))
        .await
        .unwrap();
    assert_eq!(not_array.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .put("/entities/order/42", json!({"status": "x"}))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_checks_uniqueness_against_other_records() {
    let client = start_server().await;

    // Keeping its own email is not a conflict
    let same = client
        .put("/entities/customer/1", json!({"email": "a@x.com", "name": "Ann"}))
        .await
        .unwrap();
    assert_eq!(same.status(), StatusCode::OK);

    let taken = client
        .put("/entities/customer/1", json!({"email": "b@x.com"}))
        .await
        .unwrap();
    assert_eq!(taken.status(), StatusCode::CONFLICT);
    let conflict: Value = taken.json().await.unwrap();
    assert_eq!(conflict, json!({"violated": true, "fields": ["email"]}));

    let unchecked = client
        .put(
            "/entities/customer/1?check_unique=false",
            json!({"email": "b@x.com"}),
        )
        .await
        .unwrap();
    assert_eq!(unchecked.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unique_check_endpoint() {
    let client = start_server().await;

    let conflict: Value = client
        .post(
            "/entities/customer/unique-check",
            json!({"payload": {"email": "a@x.com"}}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(conflict, json!({"violated": true, "fields": ["email"]}));

    let excluded: Value = client
        .post(
            "/entities/customer/unique-check",
            json!({"payload": {"email": "a@x.com"}, "exclude": 1}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(excluded, json!({"violated": false}));

    let free: Value = client
        .post(
            "/entities/customer/unique-check",
            json!({"payload": {"email": "c@x.com"}}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(free, json!({"violated": false}));
}
