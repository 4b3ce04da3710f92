use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// One file of a batched signing request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    #[validate(length(min = 1, max = 1024, message = "fileName must not be empty"))]
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SignedUrlsRequest {
    #[validate(nested)]
    pub files: Vec<FileSpec>,
}

/// Write URLs in the same order as the request's files.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignedUrlsResponse {
    #[serde(rename = "signedURLs")]
    pub signed_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    pub signed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
