//! # API REST
//!
//! HTTP surface of the blob store.
//!
//! Handles:
//! - HTTP endpoints with axum, mounted under `/api/v1`
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, error mapping, CORS, download headers)
//!
//! All storage semantics live in `bsfm-core`.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod routes;

use axum::Router;
use bsfm_core::constants::API_PREFIX;
use bsfm_core::FileStorageService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;
pub use routes::ApiDoc;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FileStorageService>,
}

impl AppState {
    pub fn new(service: FileStorageService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Builds the complete REST application: API routes, Swagger UI and CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, routes::routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
