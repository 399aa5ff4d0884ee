//! Object storage for event images.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::utils;

/// Uploads larger than this are refused.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload is empty")]
    EmptyUpload,
    #[error("not an image: {0}")]
    NotAnImage(String),
    #[error("image is {0} bytes, limit is {MAX_IMAGE_BYTES}")]
    TooLarge(usize),
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub public_url: String,
}

pub trait ImageBucket: Send + Sync {
    /// Stores `bytes` under a content-addressed key and returns where it can
    /// be fetched from.
    fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Checks the upload rules shared by every bucket and returns the file
/// extension to store under.
pub fn check_upload(
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<String, StorageError> {
    if bytes.is_empty() {
        return Err(StorageError::EmptyUpload);
    }
    if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(StorageError::NotAnImage(content_type.to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(StorageError::TooLarge(bytes.len()));
    }
    let ext = Path::new(file_name.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| StorageError::InvalidName(file_name.to_string()))?;
    Ok(ext)
}

/// A bucket backed by a directory on the local filesystem.
pub struct LocalBucket {
    root: PathBuf,
    bucket: String,
    public_base: String,
}

impl LocalBucket {
    /// `public_base` defaults to a `file://` URL of `root`.
    pub fn new(root: PathBuf, bucket: &str, public_base: Option<&str>) -> Self {
        let public_base = public_base
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .unwrap_or_else(|| format!("file://{}", root.display()));
        Self {
            root,
            bucket: bucket.to_string(),
            public_base,
        }
    }

    pub fn open_default(bucket: &str, public_base: Option<&str>) -> Self {
        Self::new(utils::bucket_root(), bucket, public_base)
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }
}

impl ImageBucket for LocalBucket {
    fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject, StorageError> {
        let ext = check_upload(file_name, content_type, bytes)?;
        let key = format!("{}.{ext}", utils::hex_digest(bytes));
        let path = self.bucket_dir().join(&key);
        if !path.exists() {
            fs::create_dir_all(self.bucket_dir())?;
            fs::write(&path, bytes)?;
        }
        debug!(%key, size = bytes.len(), "stored image");
        Ok(StoredObject {
            public_url: self.public_url(&key),
            key,
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, key)
    }
}
