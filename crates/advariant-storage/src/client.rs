//! Storage client implementation.

use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the storage client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for most S3-compatible providers)
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("STORAGE_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STORAGE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STORAGE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STORAGE_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("STORAGE_BUCKET_NAME not set"))?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Object storage client over the S3 API.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    /// Create a new client from configuration.
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "advariant",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = StorageConfig::from_env()?;
        Self::new(config).await
    }

    /// The bucket this client operates on.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// List objects under a prefix, optionally keeping only keys with the
    /// given suffix.
    pub async fn list(&self, prefix: &str, suffix: Option<&str>) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::list_failed(e.to_string()))?;

            if let Some(ref contents) = response.contents {
                for obj in contents {
                    let key = obj.key.clone().unwrap_or_default();
                    // Folder placeholder objects carry no payload.
                    if key.ends_with('/') {
                        continue;
                    }
                    if let Some(suffix) = suffix {
                        if !key.ends_with(suffix) {
                            continue;
                        }
                    }
                    objects.push(ObjectInfo {
                        key,
                        size: obj.size.unwrap_or(0) as u64,
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Download an object as bytes. A missing key is `Ok(None)`: optional
    /// inputs (music track, crop-command file) are represented by absence.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        debug!("Downloading {}", key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if is_missing_key_error(&e.to_string()) {
                    return Ok(None);
                }
                return Err(StorageError::download_failed(e.to_string()));
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(Some(bytes))
    }

    /// Download an object into `output_dir`, keeping its basename.
    /// Returns the local path, or `None` when the key does not exist.
    pub async fn download_to_dir(
        &self,
        key: &str,
        output_dir: impl AsRef<Path>,
    ) -> StorageResult<Option<PathBuf>> {
        let bytes = match self.download_bytes(key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let file_name = key
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let path = output_dir.as_ref().join(file_name);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(Some(path))
    }

    /// Upload a local file. When `overwrite` is false and the key already
    /// exists, the upload is skipped.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        overwrite: bool,
    ) -> StorageResult<()> {
        let path = path.as_ref();

        if !overwrite && self.exists(key).await? {
            debug!("Skipping upload of existing object: {}", key);
            return Ok(());
        }

        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Upload raw bytes.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Upload every file under `source_dir` (recursively) beneath
    /// `target_prefix`, preserving relative paths.
    pub async fn upload_dir(
        &self,
        source_dir: impl AsRef<Path>,
        target_prefix: &str,
    ) -> StorageResult<u32> {
        let source_dir = source_dir.as_ref();
        let mut uploaded = 0;
        let mut pending = vec![source_dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(source_dir)
                    .map_err(|_| StorageError::InvalidKey(path.display().to_string()))?;
                let key = format!(
                    "{}/{}",
                    target_prefix.trim_end_matches('/'),
                    relative.to_string_lossy().replace('\\', "/")
                );
                self.upload_file(&path, &key, true).await?;
                uploaded += 1;
            }
        }

        info!(
            "Uploaded {} files from {} to {}",
            uploaded,
            source_dir.display(),
            target_prefix
        );
        Ok(uploaded)
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let text = e.to_string();
                if is_missing_key_error(&text) || text.contains("NotFound") {
                    Ok(false)
                } else {
                    Err(StorageError::Sdk(text))
                }
            }
        }
    }
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

fn is_missing_key_error(text: &str) -> bool {
    text.contains("NoSuchKey")
}

/// Guess a content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("xml") => "application/xml",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/combo_1_h.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("1.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("combos.json")), "application/json");
        assert_eq!(content_type_for(Path::new("unknown.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_missing_key_detection() {
        assert!(is_missing_key_error("service error: NoSuchKey: not found"));
        assert!(!is_missing_key_error("AccessDenied"));
    }
}
