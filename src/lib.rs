pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::progress::ProgressTracker;
use crate::services::providers::ProviderRegistry;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::upload::get_upload_progress,
        api::handlers::files::get_download_url,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            services::upload_service::UploadedFile,
            services::progress::UploadProgress,
            services::progress::UploadStatus,
            utils::filetype::FileCategory,
            api::handlers::files::DownloadUrlResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "upload", description = "File upload and progress endpoints"),
        (name = "system", description = "Health and system endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub providers: Arc<ProviderRegistry>,
    pub tracker: Arc<ProgressTracker>,
    pub upload_service: Arc<UploadService>,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file).layer(axum::extract::DefaultBodyLimit::max(
                state.config.body_limit(),
            )),
        )
        .route(
            "/upload/:id/progress",
            get(api::handlers::upload::get_upload_progress),
        )
        .route("/files/:id/url", get(api::handlers::files::get_download_url))
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::context::context_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(state.config.body_limit()))
        .with_state(state)
}
