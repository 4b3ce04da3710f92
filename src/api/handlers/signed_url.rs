use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ErrorResponse, SignedUrlResponse, SignedUrlsRequest, SignedUrlsResponse};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use futures::future::try_join_all;
use validator::Validate;

#[utoipa::path(
    post,
    path = "/api/s3/signed-url",
    request_body = SignedUrlsRequest,
    responses(
        (status = 200, description = "One upload URL per file, in request order", body = SignedUrlsResponse),
        (status = 400, description = "Missing or invalid parameters", body = ErrorResponse),
        (status = 500, description = "Signing failed", body = ErrorResponse)
    ),
    tag = "signed-url"
)]
pub async fn create_upload_urls(
    State(state): State<AppState>,
    payload: Result<Json<SignedUrlsRequest>, JsonRejection>,
) -> Result<Json<SignedUrlsResponse>, AppError> {
    let Json(req) = payload.map_err(|e| {
        tracing::warn!("Rejected signing request: {}", e);
        AppError::BadRequest("Missing required parameters: fileName, fileType".to_string())
    })?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if req.files.len() > state.config.max_batch_size {
        return Err(AppError::BadRequest(format!(
            "You can only upload {} files at a time",
            state.config.max_batch_size
        )));
    }

    let ttl = state.config.signed_url_ttl();
    let signed_urls = try_join_all(
        req.files
            .iter()
            .map(|file| state.signer.presign_put(&file.file_name, &file.file_type, ttl)),
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to generate signed URLs: {:?}", e);
        AppError::Issuance("Failed to generate signed URLs".to_string())
    })?;

    tracing::info!("🔏 Issued {} signed upload URLs", signed_urls.len());
    Ok(Json(SignedUrlsResponse { signed_urls }))
}

#[utoipa::path(
    get,
    path = "/api/s3/signed-url/{bucket}/{key}",
    params(
        ("bucket" = String, Path, description = "Bucket holding the object"),
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "Download URL", body = SignedUrlResponse),
        (status = 400, description = "Missing parameters", body = ErrorResponse),
        (status = 500, description = "Signing failed", body = ErrorResponse)
    ),
    tag = "signed-url"
)]
pub async fn create_download_url(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    if bucket.trim().is_empty() || key.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Missing required parameters: key, bucket".to_string(),
        ));
    }

    let signed_url = state
        .signer
        .presign_get(&bucket, &key, state.config.signed_url_ttl())
        .await
        .map_err(|e| {
            tracing::error!("Failed to generate signed URL for {}/{}: {:?}", bucket, key, e);
            AppError::Issuance("Failed to generate signed URL".to_string())
        })?;

    Ok(Json(SignedUrlResponse { signed_url }))
}
