//! Object store port
//!
//! Deploy handlers read rendered manifests from, and write results to, an
//! object store addressed by URI (`gs://bucket/path`). Backends implement
//! [`ObjectStore`]; [`MemoryStore`] keeps everything in process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Read/write access to objects by URI.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `uri`.
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or replace the object at `uri`.
    async fn put(&self, uri: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// In-memory object store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `objects`.
    pub fn with_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            objects: RwLock::new(
                objects
                    .into_iter()
                    .map(|(uri, bytes)| (uri.into(), bytes.into()))
                    .collect(),
            ),
        }
    }

    /// URIs currently stored, sorted.
    pub async fn uris(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                uri: uri.to_string(),
            })
    }

    async fn put(&self, uri: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects.write().await.insert(uri.to_string(), bytes);
        Ok(())
    }
}

/// Join an object path and a file name with exactly one `/`.
pub(crate) fn join_uri(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}
