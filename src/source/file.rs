use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

use super::{ImageSource, ImageSourceFactory};

/// An image stored in a local file. The key is `file://<path>`.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
    key: String,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = format!("file://{}", path.display());
        Self { path, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    async fn open_source(&self) -> Result<Bytes, IoError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(IoError::NotFound(self.key.clone()))
            }
            Err(e) => Err(IoError::Read {
                key: self.key.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ImageSourceFactory for FileImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    async fn create(&self) -> Result<Arc<dyn ImageSource>, IoError> {
        Ok(Arc::new(self.clone()))
    }
}
