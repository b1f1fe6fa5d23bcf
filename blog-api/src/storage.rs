//! Object storage for uploaded images.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Builder as S3ConfigBuilder, Region},
    primitives::ByteStream,
    types::ObjectCannedAcl,
};
use axum::body::Bytes;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const IMAGE_DIRECTORY: &str = "images";
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Debug, Error)]
#[error("Storing object {key} failed: {source}")]
pub struct StorageError {
    key: String,
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl StorageError {
    pub fn new(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// An uploaded file. It is consumed by the upload, so its bytes are gone once
/// the upload returns.
#[derive(Clone, Eq, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ImageUpload {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Debug for ImageUpload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the object publicly readable under `key`.
    async fn put_object(&self, key: &str, upload: ImageUpload) -> Result<(), StorageError>;

    fn object_url(&self, key: &str) -> String;
}

impl dyn ObjectStorage + '_ {
    /// Stores the image under a fresh key and returns its public url.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<String, StorageError> {
        let key = build_file_name(&upload.file_name);
        self.put_object(&key, upload).await?;

        Ok(self.object_url(&key))
    }
}

/// `images/<stem>_<uuid><.ext>`, unique for every call.
#[must_use]
pub fn build_file_name(original: &str) -> String {
    let name = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let stem = if stem.is_empty() { "image" } else { stem };

    format!("{IMAGE_DIRECTORY}/{stem}_{}{extension}", Uuid::new_v4())
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub public_url: Option<String>,
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    public_url: Option<String>,
}

impl S3Storage {
    #[must_use]
    pub fn new(client: Client, bucket: String, region: String, public_url: Option<String>) -> Self {
        Self {
            client,
            bucket,
            region,
            public_url,
        }
    }

    pub async fn connect(settings: S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = settings.region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&sdk_config);
        if let Some(endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let region = sdk_config
            .region()
            .map_or_else(|| FALLBACK_REGION.to_owned(), ToString::to_string);
        info!(bucket = %settings.bucket, %region, "Using S3 object storage");

        Self::new(client, settings.bucket, region, settings.public_url)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, upload: ImageUpload) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(upload.content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .body(ByteStream::from(upload.bytes))
            .send()
            .await
            .map_err(|err| StorageError::new(key, err))?;

        debug!(key, bucket = %self.bucket, "Stored object");
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        match &self.public_url {
            Some(public_url) => format!("{}/{key}", public_url.trim_end_matches('/')),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            ),
        }
    }
}

/// Keeps objects in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    bucket: String,
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new(bucket: String) -> Self {
        Self {
            bucket,
            objects: Mutex::default(),
        }
    }

    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(&self, key: &str, upload: ImageUpload) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), upload.bytes);

        debug!(key, bucket = %self.bucket, "Stored object in memory");
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("memory://{}/{key}", self.bucket)
    }
}
