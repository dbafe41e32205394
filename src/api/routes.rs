use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::store::traits::RecordStore;

pub fn create_router<S: RecordStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Aggregates
        .route(
            "/entities/:entity_type/:identity",
            get(handlers::get_record::<S>).put(handlers::merge_record::<S>),
        )
        .route(
            "/entities/:entity_type/unique-check",
            post(handlers::unique_check::<S>),
        )
}
