use std::env;

/// Upper bound on files per upload batch.
pub const MAX_BATCH_SIZE: usize = 5;

/// Validity of every issued signed URL, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// Configuration for the signed URL issuer service
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Bucket that write URLs point into
    pub bucket: String,

    /// AWS region (default: "us-east-1")
    pub region: String,

    /// Custom endpoint for S3-compatible stores such as MinIO
    pub endpoint_url: Option<String>,

    /// Static credentials; when unset the issuer cannot sign
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Signed URL validity in seconds (default: 3600)
    pub signed_url_ttl_secs: u64,

    /// Maximum files accepted in one signing request (default: 5)
    pub max_batch_size: usize,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    /// Port for the HTTP server (default: 3000)
    pub port: u16,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            bucket: "uploads".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            signed_url_ttl_secs: SIGNED_URL_TTL_SECS,
            max_batch_size: MAX_BATCH_SIZE,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
            port: 3000,
        }
    }
}

impl IssuerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            bucket: env::var("AWS_BUCKET_NAME").unwrap_or(default.bucket),

            region: env::var("AWS_REGION").unwrap_or(default.region),

            endpoint_url: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),

            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),

            signed_url_ttl_secs: env::var("SIGNED_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.signed_url_ttl_secs),

            max_batch_size: env::var("MAX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.max_batch_size),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
        }
    }

    pub fn signed_url_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.signed_url_ttl_secs)
    }
}

/// Configuration for the upload client
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base URL of the issuer service (default: "http://localhost:3000")
    pub issuer_url: String,

    /// Maximum files per batch (default: 5)
    pub max_batch_size: usize,

    /// Assumed validity of issued URLs in seconds (default: 3600)
    pub token_ttl_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            issuer_url: "http://localhost:3000".to_string(),
            max_batch_size: MAX_BATCH_SIZE,
            token_ttl_secs: SIGNED_URL_TTL_SECS,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            issuer_url: env::var("ISSUER_URL").unwrap_or(default.issuer_url),

            max_batch_size: env::var("MAX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.max_batch_size),

            token_ttl_secs: env::var("SIGNED_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.token_ttl_secs),
        }
    }
}
