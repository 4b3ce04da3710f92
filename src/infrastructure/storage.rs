use crate::config::IssuerConfig;
use crate::services::signer::S3UrlSigner;
use anyhow::{Context, Result};
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_storage(config: &IssuerConfig) -> Result<Arc<S3UrlSigner>> {
    let access_key = config
        .access_key_id
        .clone()
        .context("AWS_ACCESS_KEY_ID must be set")?;
    let secret_key = config
        .secret_access_key
        .clone()
        .context("AWS_SECRET_ACCESS_KEY must be set")?;

    info!(
        "☁️  S3 Storage: {} (Bucket: {})",
        config.endpoint_url.as_deref().unwrap_or("aws"),
        config.bucket
    );

    let mut loader = aws_config::from_env()
        .region(Region::new(config.region.clone()))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.endpoint_url.is_some())
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Buckets are provisioned elsewhere; only report reachability here.
    match s3_client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.bucket),
        Err(e) => warn!(
            "⚠️ Bucket '{}' is not reachable, signed URLs may fail: {}",
            config.bucket, e
        ),
    }

    Ok(Arc::new(S3UrlSigner::new(s3_client, config.bucket.clone())))
}
