use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::logic::{MergeExecutor, UniqueConstraintChecker};
use crate::model::{
    CatalogError, ConflictResult, EntityType, Identity, MergeError, MergeOutcome, Payload,
    SchemaCatalog, ShapeError,
};
use crate::store::traits::RecordStore;

/// Everything a request needs: the store and the catalog describing its records
pub struct AppContext<S> {
    pub store: S,
    pub catalog: Arc<dyn SchemaCatalog>,
}

pub type AppState<S> = Arc<AppContext<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MergeQuery {
    pub check_unique: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UniqueCheckRequest {
    pub payload: Value,
    pub exclude: Option<Identity>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn catalog_error_response(e: &CatalogError) -> Response {
    match e {
        CatalogError::UnknownEntityType(_) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn shape_error_response(e: &ShapeError) -> Response {
    match e {
        ShapeError::Catalog(inner) => catalog_error_response(inner),
        _ => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn merge_error_response(e: &MergeError) -> Response {
    match e {
        MergeError::IdentityChanged { .. } => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        MergeError::Configuration(inner) => catalog_error_response(inner),
        _ => {
            error!("{}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

pub async fn get_record<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    Path((entity_type, identity)): Path<(String, String)>,
) -> Result<Json<Value>, Response> {
    let entity_type = EntityType::new(entity_type);
    let identity = Identity::parse_path(&identity);
    ctx.catalog
        .identity_field(&entity_type)
        .map_err(|e| catalog_error_response(&e))?;

    match ctx.store.fetch_by_identity(&entity_type, &identity).await {
        Ok(Some(record)) => Ok(Json(record.to_json())),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            &format!("'{}' {} not found", entity_type, identity),
        )),
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("{:#}", e),
        )),
    }
}

/// Merge the request body into a stored aggregate. Responds 207 when the
/// root was saved but some stale children could not be deleted.
pub async fn merge_record<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    Path((entity_type, identity)): Path<(String, String)>,
    Query(query): Query<MergeQuery>,
    RequestJson(body): RequestJson<Value>,
) -> Result<(StatusCode, Json<MergeOutcome>), Response> {
    let entity_type = EntityType::new(entity_type);
    let identity = Identity::parse_path(&identity);
    let catalog = ctx.catalog.as_ref();

    let payload =
        Payload::from_json(catalog, &entity_type, body).map_err(|e| shape_error_response(&e))?;

    let current = match ctx.store.fetch_by_identity(&entity_type, &identity).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                &format!("'{}' {} not found", entity_type, identity),
            ))
        }
        Err(e) => {
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("{:#}", e),
            ))
        }
    };

    if query.check_unique.unwrap_or(true) {
        let conflict = UniqueConstraintChecker::new(&ctx.store)
            .check_entity(catalog, &entity_type, &payload.fields, Some(&identity))
            .await
            .map_err(|e| merge_error_response(&e))?;
        if conflict.violated {
            return Err((StatusCode::CONFLICT, Json(conflict)).into_response());
        }
    }

    let outcome = MergeExecutor::new(&ctx.store, catalog)
        .execute(current, &payload)
        .await
        .map_err(|e| merge_error_response(&e))?;

    let status = if outcome.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(outcome)))
}

pub async fn unique_check<S: RecordStore>(
    State(ctx): State<AppState<S>>,
    Path(entity_type): Path<String>,
    RequestJson(request): RequestJson<UniqueCheckRequest>,
) -> Result<Json<ConflictResult>, Response> {
    let entity_type = EntityType::new(entity_type);
    let catalog = ctx.catalog.as_ref();

    let payload = Payload::from_json(catalog, &entity_type, request.payload)
        .map_err(|e| shape_error_response(&e))?;

    UniqueConstraintChecker::new(&ctx.store)
        .check_entity(catalog, &entity_type, &payload.fields, request.exclude.as_ref())
        .await
        .map(Json)
        .map_err(|e| merge_error_response(&e))
}
