//! Blob storage for payment proofs and ticket images.

use super::supabase::{auth_headers, status_error};
use crate::config::SupabaseConfig;
use crate::error::{BillingError, BillingResult};
use crate::models::Upload;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use secrecy::Secret;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

pub const PAYMENT_PROOF_PREFIX: &str = "payment_proofs";
pub const TICKET_IMAGE_PREFIX: &str = "ticket_images";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns a URL it can be fetched from.
    /// `suggested_name` is `{prefix}/{original file name}`.
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> BillingResult<String>;
}

/// `payment_proofs/receipt.JPG` becomes `payment_proofs/<uuid>.jpg`.
pub fn object_key(suggested_name: &str) -> String {
    let (prefix, file_name) = match suggested_name.rsplit_once('/') {
        Some((prefix, file_name)) => (prefix, file_name),
        None => ("", suggested_name),
    };

    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());

    if prefix.is_empty() {
        format!("{}.{}", Uuid::new_v4(), ext)
    } else {
        format!("{}/{}.{}", prefix, Uuid::new_v4(), ext)
    }
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Rejects an upload over the size limit before anything is written.
pub fn ensure_upload_size(upload: &Upload, max_bytes: usize) -> BillingResult<()> {
    if upload.is_empty() {
        return Err(BillingError::validation(format!(
            "{} is empty",
            upload.file_name
        )));
    }
    if upload.len() > max_bytes {
        return Err(BillingError::validation(format!(
            "{} is {} bytes, the limit is {}",
            upload.file_name,
            upload.len(),
            max_bytes
        )));
    }
    Ok(())
}

pub struct LocalBlobStore {
    base_path: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> BillingResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .await
                .map_err(|e| BillingError::Storage(e.to_string()))?;
        }
        Ok(Self {
            base_path,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> BillingResult<String> {
        let key = object_key(suggested_name);
        let path = self.base_path.join(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BillingError::Storage(e.to_string()))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| BillingError::Storage(format!("write {} failed: {}", key, e)))?;

        Ok(format!("{}/{}", self.public_url, key))
    }
}

pub struct SupabaseBlobStore {
    client: Client,
    url: String,
    bucket: String,
    key: Secret<String>,
}

impl SupabaseBlobStore {
    pub fn new(config: &SupabaseConfig, bucket: impl Into<String>) -> BillingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BillingError::Storage(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            key: config.service_role_key.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len(), bucket = %self.bucket))]
    async fn store(&self, bytes: Vec<u8>, suggested_name: &str) -> BillingResult<String> {
        let key = object_key(suggested_name);
        let mut headers = auth_headers(&self.key).map_err(|e| BillingError::Storage(e.to_string()))?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(&key)));

        let response = self
            .client
            .post(format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, key))
            .headers(headers)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BillingError::Storage(format!("upload {} failed: {}", key, e.without_url())))?;

        if !response.status().is_success() {
            let err = status_error("upload", response).await;
            return Err(BillingError::Storage(err.to_string()));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.url, self.bucket, key
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_keeps_prefix_and_extension() {
        let key = object_key("payment_proofs/GCash Receipt.JPG");
        assert!(key.starts_with("payment_proofs/"));
        assert!(key.ends_with(".jpg"));
        assert_ne!(key, object_key("payment_proofs/GCash Receipt.JPG"));
    }

    #[test]
    fn test_object_key_without_extension() {
        assert!(object_key("ticket_images/photo").ends_with(".bin"));
        assert!(object_key("noprefix.png").ends_with(".png"));
    }

    #[test]
    fn test_upload_size_limit() {
        let upload = Upload::new("proof.png", vec![0; 11]);
        assert!(ensure_upload_size(&upload, 11).is_ok());
        let err = ensure_upload_size(&upload, 10).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(ensure_upload_size(&Upload::new("empty.png", Vec::new()), 10).is_err());
    }

    #[tokio::test]
    async fn test_local_store_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost/uploads/")
            .await
            .unwrap();

        let url = store
            .store(b"receipt".to_vec(), "payment_proofs/r.png")
            .await
            .unwrap();

        let key = url.strip_prefix("http://localhost/uploads/").unwrap();
        assert!(key.starts_with("payment_proofs/"));
        assert_eq!(std::fs::read(dir.path().join(key)).unwrap(), b"receipt");
    }
}
