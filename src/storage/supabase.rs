use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use super::PhotoStore;

#[derive(Debug, Clone)]
pub struct SupabaseStorageConfig {
    pub endpoint: Url,
    pub service_key: String,
    pub bucket: String,
}

/// Talks to the Supabase Storage REST API.
/// https://supabase.com/docs/reference/api/storage
pub struct SupabaseStorageClient {
    http: reqwest::Client,
    base: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorageClient {
    pub fn new(config: SupabaseStorageConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build storage http client")?;

        Ok(Self {
            http,
            base: config.endpoint.as_str().trim_end_matches('/').to_string(),
            service_key: config.service_key,
            bucket: config.bucket,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base, self.bucket, key)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
    }
}

#[async_trait]
impl PhotoStore for SupabaseStorageClient {
    async fn ensure_bucket(&self) -> Result<()> {
        let resp = self
            .authed(self.http.post(format!("{}/storage/v1/bucket", self.base)))
            .json(&json!({
                "id": self.bucket,
                "name": self.bucket,
                "public": true,
            }))
            .send()
            .await
            .context("create bucket request failed")?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        if body.contains("already exists") || body.contains("Duplicate") {
            return Ok(());
        }

        Err(anyhow!(
            "failed to create bucket {} (status {}): {}",
            self.bucket,
            status,
            body.chars().take(512).collect::<String>()
        ))
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let resp = self
            .authed(self.http.post(self.object_url(key)))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await
            .context("upload request failed")?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!(
            "failed to upload photo (status {}) [bucket={}, key={}]; body={}",
            status,
            self.bucket,
            key,
            body.chars().take(512).collect::<String>()
        ))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let url = format!(
            "{}/storage/v1/object/authenticated/{}/{}",
            self.base, self.bucket, key
        );
        let resp = self
            .authed(self.http.head(url))
            .send()
            .await
            .context("existence check failed")?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            // storage answers 400 for missing objects on some versions
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
            status => Err(anyhow!("existence check returned status {}", status)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base, self.bucket, key
        )
    }

    fn backend_name(&self) -> &'static str {
        "supabase"
    }
}
