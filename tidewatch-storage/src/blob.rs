//! Blob storage gateway.
//!
//! Audio recordings live in an object store, one bucket per project. The
//! engine only ever deletes objects and manages buckets; uploads happen
//! elsewhere.

use ::async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tidewatch_core::constants::MAX_BLOB_BATCH_SIZE;
use tidewatch_core::BlobError;

/// Object-store operations used by project creation and hard delete.
///
/// Every call may fail independently. Callers treat failures as
/// diagnostics, never as reasons to abort a relational commit.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BlobError>;

    /// Delete up to 1000 keys in one call.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BlobError>;

    /// Create the bucket. Succeeds if it already exists.
    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BlobError>;
}

fn poisoned(bucket: &str) -> BlobError {
    BlobError::Bucket {
        bucket: bucket.to_string(),
        reason: "blob store lock poisoned".to_string(),
    }
}

/// In-memory object store that records every multi-object delete.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    buckets: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
    delete_batches: Arc<RwLock<Vec<usize>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object, creating the bucket if needed.
    pub fn put_object(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned(bucket))?;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .map(|b| b.get(bucket).is_some_and(|keys| keys.contains(key)))
            .unwrap_or(false)
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets
            .read()
            .map(|b| b.contains_key(bucket))
            .unwrap_or(false)
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .map(|b| b.get(bucket).map_or(0, BTreeSet::len))
            .unwrap_or(0)
    }

    /// Sizes of every `delete_objects` call, in call order.
    pub fn delete_batches(&self) -> Vec<usize> {
        self.delete_batches
            .read()
            .map(|b| b.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BlobError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned(bucket))?;
        if let Some(keys) = buckets.get_mut(bucket) {
            keys.remove(key);
        }
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BlobError> {
        if keys.len() > MAX_BLOB_BATCH_SIZE {
            return Err(BlobError::BatchTooLarge {
                size: keys.len(),
                max: MAX_BLOB_BATCH_SIZE,
            });
        }
        self.delete_batches
            .write()
            .map_err(|_| poisoned(bucket))?
            .push(keys.len());
        let mut buckets = self.buckets.write().map_err(|_| poisoned(bucket))?;
        if let Some(stored) = buckets.get_mut(bucket) {
            for key in keys {
                stored.remove(key);
            }
        }
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned(bucket))?;
        buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned(bucket))?;
        match buckets.get(bucket) {
            None => Err(BlobError::Bucket {
                bucket: bucket.to_string(),
                reason: "no such bucket".to_string(),
            }),
            Some(keys) if !keys.is_empty() => Err(BlobError::Bucket {
                bucket: bucket.to_string(),
                reason: format!("bucket not empty ({} objects)", keys.len()),
            }),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_objects_records_batches() {
        let store = InMemoryBlobStore::new();
        for i in 0..3 {
            store.put_object("alpha", &format!("a/{i}.wav")).unwrap();
        }
        let keys = vec!["a/0.wav".to_string(), "a/1.wav".to_string()];
        store.delete_objects("alpha", &keys).await.unwrap();
        assert_eq!(store.delete_batches(), vec![2]);
        assert_eq!(store.object_count("alpha"), 1);
        assert!(store.contains("alpha", "a/2.wav"));
    }

    #[tokio::test]
    async fn test_delete_objects_rejects_oversized_batch() {
        let store = InMemoryBlobStore::new();
        let keys: Vec<String> = (0..1001).map(|i| format!("k{i}")).collect();
        let err = store.delete_objects("alpha", &keys).await.unwrap_err();
        assert_eq!(
            err,
            BlobError::BatchTooLarge {
                size: 1001,
                max: 1000
            }
        );
        assert!(store.delete_batches().is_empty());
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = InMemoryBlobStore::new();
        store.create_bucket("alpha").await.unwrap();
        store.create_bucket("alpha").await.unwrap();
        assert!(store.has_bucket("alpha"));

        store.put_object("alpha", "x.wav").unwrap();
        assert!(store.delete_bucket("alpha").await.is_err());

        store.delete_object("alpha", "x.wav").await.unwrap();
        store.delete_bucket("alpha").await.unwrap();
        assert!(!store.has_bucket("alpha"));
    }
}
