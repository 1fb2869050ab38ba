use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

use super::{ImageSource, ImageSourceFactory};

/// An image whose encoded bytes are already in memory.
#[derive(Debug, Clone)]
pub struct BytesImageSource {
    key: String,
    data: Bytes,
}

impl BytesImageSource {
    pub fn new(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl ImageSource for BytesImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    async fn open_source(&self) -> Result<Bytes, IoError> {
        Ok(self.data.clone())
    }
}

#[async_trait]
impl ImageSourceFactory for BytesImageSource {
    fn key(&self) -> &str {
        &self.key
    }

    async fn create(&self) -> Result<Arc<dyn ImageSource>, IoError> {
        Ok(Arc::new(self.clone()))
    }
}
