//! Object storage boundary

use crate::error::StoreError;
use crate::key::ObjectKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Durable, publicly readable object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key` with public read access
    async fn put_object(&self, key: &ObjectKey, body: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Permanent public URL of `key`
    fn public_url(&self, key: &ObjectKey) -> String;
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Files under a directory served at `public_base_url`
    Local {
        root: PathBuf,
        public_base_url: String,
    },
    /// HTTP `PUT` to an S3-compatible endpoint
    Http {
        upload_endpoint: String,
        public_base_url: String,
        #[serde(default)]
        bearer_token: Option<String>,
        #[serde(default = "default_upload_timeout")]
        timeout_secs: u64,
    },
}

fn default_upload_timeout() -> u64 {
    300
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: std::env::temp_dir().join("motion-artifacts"),
            public_base_url: "http://localhost:8080/artifacts".to_string(),
        }
    }
}

impl StorageConfig {
    /// Public base URL of either backend
    #[must_use]
    pub fn public_base_url(&self) -> &str {
        match self {
            Self::Local {
                public_base_url, ..
            }
            | Self::Http {
                public_base_url, ..
            } => public_base_url,
        }
    }

    /// Construct the configured store
    ///
    /// # Errors
    /// Returns `Config` if the HTTP client cannot be built
    pub fn build(&self) -> Result<Arc<dyn ObjectStore>, StoreError> {
        Ok(match self {
            Self::Local {
                root,
                public_base_url,
            } => Arc::new(LocalObjectStore::new(root.clone(), public_base_url.clone())),
            Self::Http {
                upload_endpoint,
                public_base_url,
                bearer_token,
                timeout_secs,
            } => Arc::new(HttpObjectStore::new(
                upload_endpoint.clone(),
                public_base_url.clone(),
                bearer_token.clone(),
                Duration::from_secs(*timeout_secs),
            )?),
        })
    }
}

fn join_url(base: &str, key: &ObjectKey) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Store writing into a local directory tree
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    #[must_use]
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    /// On-disk location of `key`
    #[must_use]
    pub fn path_of(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, key: &ObjectKey, body: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        tracing::debug!("Stored {} at {}", key, path.display());
        Ok(())
    }

    fn public_url(&self, key: &ObjectKey) -> String {
        join_url(&self.public_base_url, key)
    }
}

/// Store uploading with HTTP `PUT`
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    upload_endpoint: String,
    public_base_url: String,
    bearer_token: Option<String>,
}

impl HttpObjectStore {
    /// # Errors
    /// Returns `Config` if the HTTP client cannot be built
    pub fn new(
        upload_endpoint: String,
        public_base_url: String,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(Self {
            client,
            upload_endpoint,
            public_base_url,
            bearer_token,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &ObjectKey, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put(join_url(&self.upload_endpoint, key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-amz-acl", "public-read")
            .body(body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!("Uploaded {} ({})", key, status);
        Ok(())
    }

    fn public_url(&self, key: &ObjectKey) -> String {
        join_url(&self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_ledger::{JobId, OwnerId};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn key() -> ObjectKey {
        ObjectKey::new(&OwnerId::parse("alice").unwrap(), &JobId::parse("j1").unwrap(), "v.mp4").unwrap()
    }

    #[tokio::test]
    async fn local_store_writes_under_key() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path().to_path_buf(), "https://cdn.test/media/".to_string());

        store.put_object(&key(), b"frames".to_vec(), "video/mp4").await.unwrap();

        assert_eq!(std::fs::read(root.path().join("alice/j1/v.mp4")).unwrap(), b"frames");
        assert_eq!(store.public_url(&key()), "https://cdn.test/media/alice/j1/v.mp4");
    }

    #[tokio::test]
    async fn http_store_puts_with_public_acl() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            // headers plus the 6-byte body
            while !String::from_utf8_lossy(&buf).ends_with("frames") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf).to_lowercase()
        });

        let store = HttpObjectStore::new(
            format!("http://{addr}/bucket"),
            "https://cdn.test".to_string(),
            Some("tok".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        store.put_object(&key(), b"frames".to_vec(), "video/mp4").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("put /bucket/alice/j1/v.mp4 "));
        assert!(request.contains("x-amz-acl: public-read"));
        assert!(request.contains("authorization: bearer tok"));
        assert!(request.contains("content-type: video/mp4"));
    }

    #[test]
    fn storage_config_from_toml() {
        let config: StorageConfig = toml::from_str(
            "backend = \"http\"\nupload_endpoint = \"https://s3.test/b\"\npublic_base_url = \"https://cdn.test\"\n",
        )
        .unwrap();
        assert!(matches!(config, StorageConfig::Http { timeout_secs: 300, .. }));
        assert_eq!(config.public_base_url(), "https://cdn.test");
    }
}
