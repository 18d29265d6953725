//! Object storage for payment slips

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, ExternalError};
use crate::middleware::logging::log_external_call;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage request failed: {message}")]
    Network { message: String },

    #[error("storage rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::external(ExternalError::Storage {
            message: err.to_string(),
        })
    }
}

/// Where an uploaded slip ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct SlipUpload {
    pub folder: String,
    pub order_id: Uuid,
    pub extension: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SlipUpload {
    /// `{folder}/{order_id}/{uuid}.{ext}`; the random name keeps resubmissions apart.
    pub fn object_path(&self) -> (String, String) {
        let filename = format!("{}.{}", Uuid::new_v4(), self.extension);
        let path = format!(
            "{}/{}/{}",
            self.folder.trim_matches('/'),
            self.order_id,
            filename
        );
        (path, filename)
    }
}

#[async_trait]
pub trait SlipStorage: Send + Sync {
    async fn upload(&self, upload: SlipUpload) -> Result<StoredObject, StorageError>;
}

/// REST object storage (`/storage/v1/object/{bucket}/{path}`)
pub struct HttpSlipStorage {
    client: Client,
    config: StorageConfig,
}

impl HttpSlipStorage {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Network {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    pub fn upload_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base(), self.config.bucket, path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base(),
            self.config.bucket,
            path
        )
    }
}

#[async_trait]
impl SlipStorage for HttpSlipStorage {
    async fn upload(&self, upload: SlipUpload) -> Result<StoredObject, StorageError> {
        let (path, filename) = upload.object_path();

        let request = self
            .client
            .post(self.upload_url(&path))
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .header("content-type", &upload.content_type)
            .header("x-upsert", "false")
            .body(upload.bytes);

        let response = log_external_call("storage", "POST /storage/v1/object", async {
            request.send().await.map_err(|e| StorageError::Network {
                message: e.to_string(),
            })
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(StoredObject {
            url: self.public_url(&path),
            path,
            filename,
        })
    }
}

/// Keeps uploads in memory; for tests and `SKIP_EXTERNALS` mode.
#[derive(Default, Clone)]
pub struct InMemorySlipStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemorySlipStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl SlipStorage for InMemorySlipStorage {
    async fn upload(&self, upload: SlipUpload) -> Result<StoredObject, StorageError> {
        let (path, filename) = upload.object_path();
        self.objects
            .write()
            .await
            .insert(path.clone(), upload.bytes);
        Ok(StoredObject {
            url: format!("memory://slips/{}", path),
            path,
            filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slip(order_id: Uuid) -> SlipUpload {
        SlipUpload {
            folder: "payment-slips/".to_string(),
            order_id,
            extension: "png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn object_path_layout() {
        let order_id = Uuid::new_v4();
        let (path, filename) = slip(order_id).object_path();
        assert!(path.starts_with(&format!("payment-slips/{}/", order_id)));
        assert!(path.ends_with(&filename));
        assert!(filename.ends_with(".png"));
    }

    #[test]
    fn http_storage_urls() {
        let storage = HttpSlipStorage::new(StorageConfig {
            base_url: "https://files.example.com/".to_string(),
            bucket: "payments".to_string(),
            service_key: "key".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            storage.upload_url("a/b.png"),
            "https://files.example.com/storage/v1/object/payments/a/b.png"
        );
        assert_eq!(
            storage.public_url("a/b.png"),
            "https://files.example.com/storage/v1/object/public/payments/a/b.png"
        );
    }

    #[tokio::test]
    async fn in_memory_storage_keeps_bytes() {
        let storage = InMemorySlipStorage::new();
        let stored = storage.upload(slip(Uuid::new_v4())).await.unwrap();
        assert_eq!(storage.object_count().await, 1);
        assert_eq!(storage.get(&stored.path).await, Some(vec![1, 2, 3]));
        assert!(stored.url.ends_with(&stored.path));
    }
}
