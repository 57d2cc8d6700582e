use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Storage operation failed: {0}")]
    OperationFailed(String),
}

/// Thin client for the bucket/object HTTP API that holds tweet images and avatars.
#[derive(Clone)]
pub struct ObjectStorageClient {
    client: Client,
    base_url: String,
    bucket: String,
    media_base_url: String,
}

impl ObjectStorageClient {
    pub fn new(base_url: String, bucket: String, media_base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bucket,
            media_base_url,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/buckets/{}/objects/{}", self.base_url, self.bucket, key)
    }

    /// URL clients use to fetch a stored object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.media_base_url.trim_end_matches('/'), key)
    }

    pub async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut req = self.client.put(self.object_url(key)).body(data);

        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            return Err(StorageError::OperationFailed(format!(
                "Upload failed with status: {}",
                response.status()
            )));
        }

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.client.delete(self.object_url(key)).send().await?;

        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(StorageError::OperationFailed(format!(
                "Delete failed with status: {}",
                response.status()
            )));
        }

        Ok(())
    }
}
