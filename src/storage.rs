use std::{path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MediaConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    fn public_url(&self, key: &str) -> String;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base: String,
}

impl Storage {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        let public_base = cfg.public_url.clone().unwrap_or_else(|| {
            format!("{}/{}", cfg.endpoint.trim_end_matches('/'), cfg.bucket)
        });

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

/// Best-effort upload of local temp files to the media host.
#[derive(Clone)]
pub struct MediaUploader {
    storage: Arc<dyn StorageClient>,
    folder: String,
}

impl MediaUploader {
    pub fn new(storage: Arc<dyn StorageClient>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    /// Uploads the file at `path`, removes it locally on success and returns its
    /// public URL. Every failure is logged and reported as `None`.
    pub async fn upload_file(&self, path: &Path) -> Option<String> {
        let (ext, content_type) = detect_content_type(path);
        let body = match tokio::fs::read(path).await {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "read upload failed");
                return None;
            }
        };
        let key = format!("{}/{}.{}", self.folder.trim_matches('/'), Uuid::new_v4(), ext);

        if let Err(e) = self.storage.put_object(&key, body, content_type).await {
            warn!(error = ?e, path = %path.display(), "file upload failed");
            return None;
        }
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(error = %e, path = %path.display(), "remove uploaded temp file failed");
        }

        let url = self.storage.public_url(&key);
        info!(%url, "file upload complete");
        Some(url)
    }
}

/// Resource type from the file extension; unknown types go up as raw bytes.
fn detect_content_type(path: &Path) -> (&'static str, &'static str) {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => ("jpg", "image/jpeg"),
        Some("png") => ("png", "image/png"),
        Some("webp") => ("webp", "image/webp"),
        Some("gif") => ("gif", "image/gif"),
        Some("heic") => ("heic", "image/heic"),
        Some("svg") => ("svg", "image/svg+xml"),
        Some("mp4") => ("mp4", "video/mp4"),
        Some("webm") => ("webm", "video/webm"),
        Some("pdf") => ("pdf", "application/pdf"),
        _ => ("bin", "application/octet-stream"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type(Path::new("a/b.JPG")), ("jpg", "image/jpeg"));
        assert_eq!(detect_content_type(Path::new("b.jpeg")), ("jpg", "image/jpeg"));
        assert_eq!(detect_content_type(Path::new("c.png")), ("png", "image/png"));
        assert_eq!(detect_content_type(Path::new("d.mp4")), ("mp4", "video/mp4"));
        assert_eq!(
            detect_content_type(Path::new("noext")),
            ("bin", "application/octet-stream")
        );
    }

    #[tokio::test]
    async fn upload_removes_local_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        tokio::fs::write(&path, b"\x89PNG").await.unwrap();

        let storage = Arc::new(FakeStorage::default());
        let uploader = MediaUploader::new(storage.clone(), "avatars");

        let url = uploader.upload_file(&path).await.expect("url");
        assert!(url.starts_with("https://media.test/avatars/"));
        assert!(url.ends_with(".png"));
        assert!(!path.exists());

        let objects = storage.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].1, "image/png");
    }

    #[tokio::test]
    async fn failed_upload_is_none_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        tokio::fs::write(&path, b"jpeg").await.unwrap();

        let storage = Arc::new(FakeStorage::failing());
        let uploader = MediaUploader::new(storage, "uploads");

        assert_eq!(uploader.upload_file(&path).await, None);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let uploader = MediaUploader::new(Arc::new(FakeStorage::default()), "uploads");
        assert_eq!(uploader.upload_file(Path::new("/nonexistent/x.png")).await, None);
    }
}
