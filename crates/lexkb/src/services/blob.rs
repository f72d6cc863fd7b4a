//! Blob stores for uploaded documents.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::BlobStore;
use crate::error::ServiceError;
use crate::sanitize;

/// Reads objects from `<root>/<bucket>/<path>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves an object key, refusing anything that could leave the root.
    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, ServiceError> {
        let mut resolved = self.root.clone();
        for key in [bucket, path] {
            let key_path = Path::new(key);
            if key.trim().is_empty() {
                return Err(ServiceError::InvalidPath("empty object key".to_string()));
            }
            for component in key_path.components() {
                match component {
                    Component::Normal(part) => resolved.push(part),
                    Component::CurDir => {}
                    _ => return Err(ServiceError::InvalidPath(key.to_string())),
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        let file = self.resolve(bucket, path)?;
        debug!("Reading blob {}", sanitize::redact_path(&file));
        tokio::fs::read(&file)
            .await
            .map_err(|e| ServiceError::Io { path: file, source: e })
    }
}

/// Supabase-storage compatible object download over HTTP.
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpBlobStore {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, ServiceError> {
        if path.split('/').any(|part| part == "..") {
            return Err(ServiceError::InvalidPath(path.to_string()));
        }

        let url = self.object_url(bucket, path);
        debug!("Downloading {}", sanitize::redact_url(&url));

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request
                .bearer_auth(key.expose_secret())
                .header("apikey", key.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }
}
