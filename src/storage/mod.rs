pub mod memory;
pub mod supabase;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Object storage for proof-of-delivery photographs.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Creates the bucket if it does not exist yet. Existing buckets are not an error.
    async fn ensure_bucket(&self) -> Result<()>;

    /// Stores the object, replacing any previous one under the same key.
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    fn public_url(&self, key: &str) -> String;

    fn backend_name(&self) -> &'static str;
}

pub fn proof_object_key(delivery_id: uuid::Uuid, content_type: &str) -> String {
    format!("proofs/{}.{}", delivery_id, extension_for(content_type))
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::proof_object_key;

    #[test]
    fn key_extension_follows_content_type() {
        let id = Uuid::nil();
        assert_eq!(
            proof_object_key(id, "image/png"),
            "proofs/00000000-0000-0000-0000-000000000000.png"
        );
        assert!(proof_object_key(id, "image/jpeg").ends_with(".jpg"));
        assert!(proof_object_key(id, "IMAGE/WEBP; q=1").ends_with(".webp"));
    }
}
