use async_trait::async_trait;
use thiserror::Error;

/// Outcome classes of a blob store call.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("bucket missing or misconfigured: {0}")]
    BucketUnavailable(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    Other(String),
}

/// The three calls the pipeline needs from an object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Metadata-only existence check. `Ok(false)` means absent; anything else is an error.
    async fn head(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<(), StoreError>;
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryBlobStore, StoredObject};

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use super::{BlobStore, StoreError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct StoredObject {
        pub bytes: Vec<u8>,
        pub content_type: String,
        pub cache_control: String,
    }

    /// In-process store with call counters and fault injection.
    #[derive(Default)]
    pub struct MemoryBlobStore {
        objects: Mutex<HashMap<(String, String), StoredObject>>,
        head_error: Mutex<Option<StoreError>>,
        get_error: Mutex<Option<StoreError>>,
        put_error: Mutex<Option<StoreError>>,
        heads: AtomicUsize,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) {
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                    cache_control: String::new(),
                },
            );
        }

        pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
        }

        pub fn fail_heads_with(&self, err: StoreError) {
            *self.head_error.lock().unwrap() = Some(err);
        }

        pub fn fail_gets_with(&self, err: StoreError) {
            *self.get_error.lock().unwrap() = Some(err);
        }

        pub fn fail_puts_with(&self, err: StoreError) {
            *self.put_error.lock().unwrap() = Some(err);
        }

        pub fn head_count(&self) -> usize {
            self.heads.load(Ordering::SeqCst)
        }

        pub fn get_count(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        pub fn put_count(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        pub fn call_count(&self) -> usize {
            self.head_count() + self.get_count() + self.put_count()
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn head(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
            self.heads.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.head_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self.object(bucket, key).is_some())
        }

        async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.get_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.object(bucket, key)
                .map(|o| o.bytes)
                .ok_or(StoreError::NotFound)
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
            cache_control: &str,
        ) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.put_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.objects.lock().unwrap().insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes,
                    content_type: content_type.to_string(),
                    cache_control: cache_control.to_string(),
                },
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        assert!(!store.head("b", "k").await.unwrap());
        assert!(matches!(store.get("b", "k").await, Err(StoreError::NotFound)));

        store
            .put("b", "k", vec![1, 2, 3], "image/png", "max-age=60")
            .await
            .unwrap();
        assert!(store.head("b", "k").await.unwrap());
        assert_eq!(store.get("b", "k").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.object("b", "k").unwrap().cache_control, "max-age=60");
        assert_eq!(store.call_count(), 5);
    }
}
