use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::S3Config;
use crate::interviews::repo_types::FileAttachment;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// Public location of a stored object.
    fn object_url(&self, key: &str) -> String;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
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

        Ok(Self {
            client: Client::from_conf(conf),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            bucket: cfg.bucket.clone(),
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

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

/// Object key for an answer upload: one prefix per user, random name, original extension.
pub fn answer_key(user_id: i64, file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("answers/{}/{}.{}", user_id, Uuid::new_v4(), ext),
        None => format!("answers/{}/{}", user_id, Uuid::new_v4()),
    }
}

/// Stores `body` and describes it the way answers record files.
pub async fn upload(
    storage: &dyn StorageClient,
    key: &str,
    file_name: &str,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<FileAttachment> {
    let size = body.len() as i64;
    storage.put_object(key, body, content_type).await?;
    debug!(key, size, content_type, "object stored");
    Ok(FileAttachment {
        name: file_name.to_string(),
        url: storage.object_url(key),
        size,
        mime_type: content_type.to_string(),
    })
}

/// Best-effort removal of an upload whose answer could not be updated.
pub async fn discard(storage: &dyn StorageClient, key: &str) {
    if let Err(e) = storage.delete_object(key).await {
        warn!(error = %e, key, "orphaned upload left in bucket");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_key_keeps_plain_extension() {
        let key = answer_key(7, "CV.Final.PDF");
        assert!(key.starts_with("answers/7/"));
        assert!(key.ends_with(".pdf"));
    }

    #[test]
    fn answer_key_drops_odd_extension() {
        let key = answer_key(7, "notes.t x/t");
        assert!(!key.contains(' '));
        assert_eq!(key.matches('/').count(), 2);
        assert_ne!(answer_key(7, "a.txt"), answer_key(7, "a.txt"));
    }
}
