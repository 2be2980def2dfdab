use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;

use crate::config::S3Config;

/// Narrow object-storage seam behind the upload route. Returns the public
/// URL of the stored object, or `None` when nothing durable was written.
#[async_trait]
pub trait PictureStorage: Send + Sync {
    async fn store(
        &self,
        filename: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<Option<String>>;
}

/// S3/MinIO-backed storage.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl Storage {
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PictureStorage for Storage {
    async fn store(
        &self,
        filename: &str,
        body: Bytes,
        content_type: &str,
    ) -> anyhow::Result<Option<String>> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(filename)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        // path-style URL, matching force_path_style above
        Ok(Some(format!("{}/{}/{}", self.endpoint, self.bucket, filename)))
    }
}

/// Accepts the upload and drops it. Deployments without object storage run
/// on ephemeral disks, so writing locally would not outlive a restart.
pub struct Ephemeral;

#[async_trait]
impl PictureStorage for Ephemeral {
    async fn store(
        &self,
        filename: &str,
        body: Bytes,
        _content_type: &str,
    ) -> anyhow::Result<Option<String>> {
        tracing::debug!(filename, size = body.len(), "upload acknowledged, not persisted");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_storage_returns_no_url() {
        let url = Ephemeral
            .store("pic.png", Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert_eq!(url, None);
    }
}
