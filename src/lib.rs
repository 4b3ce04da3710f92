pub mod api;
pub mod client;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;

use crate::config::IssuerConfig;
use crate::services::signer::UrlSigner;
use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::signed_url::create_upload_urls,
        api::handlers::signed_url::create_download_url,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::FileSpec,
            models::SignedUrlsRequest,
            models::SignedUrlsResponse,
            models::SignedUrlResponse,
            models::ErrorResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "signed-url", description = "Presigned URL issuance"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub signer: Arc<dyn UrlSigner>,
    pub config: IssuerConfig,
}

pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/s3/signed-url",
            post(api::handlers::signed_url::create_upload_urls),
        )
        .route(
            "/api/s3/signed-url/:bucket/:key",
            get(api::handlers::signed_url::create_download_url),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .with_state(state)
}
