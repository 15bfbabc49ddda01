use crate::aws::{AwsSession, SigV4Signer};
use crate::error::IngestError;
use crate::text::encode_storage_key;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

/// Signed `GetObject` against S3 or an S3-compatible endpoint.
pub struct S3ObjectStore {
    client: Client,
    signer: SigV4Signer,
    region: String,
    endpoint_url: Option<String>,
}

impl S3ObjectStore {
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: Client::new(),
            signer: session.signer("s3"),
            region: session.region().to_string(),
            endpoint_url: None,
        }
    }

    /// Path-style addressing against a custom endpoint (MinIO, LocalStack).
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, url::ParseError> {
        let encoded_key = encode_storage_key(key);
        let raw = match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                urlencoding::encode(bucket),
                encoded_key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                bucket, self.region, encoded_key
            ),
        };
        Url::parse(&raw)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError> {
        let fetch_error = |details: String| IngestError::ObjectFetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            details,
        };

        let url = self
            .object_url(bucket, key)
            .map_err(|error| fetch_error(error.to_string()))?;

        let signed_headers = self
            .signer
            .sign("GET", &url, b"")
            .map_err(|error| fetch_error(error.to_string()))?;

        let mut request = self.client.get(url.clone());
        for (name, value) in signed_headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("GetObject returned {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Serves objects from `<root>/<bucket>/<key>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError> {
        let path = self.bucket_dir(bucket).join(key);
        tokio::fs::read(&path)
            .await
            .map_err(|error| IngestError::ObjectFetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                details: format!("{}: {error}", path.display()),
            })
    }
}

/// Lists every file under `dir` as a `/`-separated object key, sorted.
pub fn discover_object_keys(dir: &Path) -> Vec<String> {
    let mut keys = Vec::new();

    for entry in WalkDir::new(dir).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };

        let key = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        keys.push(key);
    }

    keys.sort_unstable();
    keys
}
