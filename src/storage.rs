use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Presigned attachment URLs stay valid for 10 minutes.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// MIME types a concern attachment may have.
pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "application/pdf",
    "video/mp4",
];

/// StorageService
///
/// Object storage for concern attachments (photos, PDFs, short videos). The
/// client uploads straight to the bucket with a presigned URL and then submits
/// the returned key with the concern.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket if missing. Only called for `Env::Local` (MinIO).
    async fn ensure_bucket_exists(&self);

    /// A time-limited PUT URL for `key`, constrained to `content_type`.
    async fn get_presigned_upload_url(&self, key: &str, content_type: &str) -> AppResult<String>;
}

/// S3StorageClient
///
/// aws-sdk-s3 client for MinIO (local) or any S3-compatible store (production).
/// Path-style addressing is required by MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket fails harmlessly.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn get_presigned_upload_url(&self, key: &str, content_type: &str) -> AppResult<String> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| AppError::Internal(format!("presigning config: {e}")))?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            // The uploader must send this exact Content-Type.
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("storage: {e}")))?;

        Ok(presigned_req.uri().to_string())
    }
}

/// attachment_key
///
/// Builds the object key for a new attachment (`concerns/<uuid>.<ext>`) after
/// checking the declared content type. The client filename only contributes
/// its extension.
pub fn attachment_key(filename: &str, content_type: &str) -> AppResult<String> {
    if !ALLOWED_ATTACHMENT_TYPES.contains(&content_type) {
        return Err(AppError::Validation(format!(
            "unsupported attachment type {content_type}"
        )));
    }

    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin")
        .to_ascii_lowercase();

    Ok(format!("concerns/{}.{}", Uuid::new_v4(), extension))
}

/// Strips `.`/`..` and empty segments from a key.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic storage double for handler tests; no network access.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(&self, key: &str, _content_type: &str) -> AppResult<String> {
        if self.should_fail {
            return Err(AppError::UpstreamUnavailable(
                "mock storage: simulated failure".to_string(),
            ));
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

pub type StorageState = Arc<dyn StorageService>;
