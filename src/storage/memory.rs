use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::PhotoStore;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub body: Bytes,
}

/// Process-local store used when no storage service is configured.
pub struct MemoryPhotoStore {
    bucket: String,
    objects: DashMap<String, StoredObject>,
}

impl MemoryPhotoStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn ensure_bucket(&self) -> Result<()> {
        Ok(())
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                body,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::MemoryPhotoStore;
    use crate::storage::PhotoStore;

    #[tokio::test]
    async fn upload_then_exists() {
        let store = MemoryPhotoStore::new("pod");
        assert!(!store.exists("proofs/a.jpg").await.unwrap());

        store
            .upload("proofs/a.jpg", Bytes::from_static(b"\xff\xd8"), "image/jpeg")
            .await
            .unwrap();

        assert!(store.exists("proofs/a.jpg").await.unwrap());
        assert_eq!(store.get("proofs/a.jpg").unwrap().content_type, "image/jpeg");
        assert_eq!(store.public_url("proofs/a.jpg"), "memory://pod/proofs/a.jpg");
    }
}
