use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::error;
use url::Url;

use super::{PaymentGateway, PaymentIntent, PaymentIntentRequest};

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: Url,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResp {
    id: String,
    client_secret: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String, api_base: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build stripe http client")?;

        Ok(Self {
            http,
            secret_key,
            api_base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("invalid stripe endpoint {path}"))
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (error_type, error_code, error_message) =
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => (
                    envelope.error.type_,
                    envelope.error.code,
                    envelope.error.message,
                ),
                Err(_) => (None, None, None),
            };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?error_type,
            stripe_error_code = ?error_code,
            stripe_error_message = ?error_message,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}{})",
            context,
            status,
            error_message
                .map(|message| format!(": {message}"))
                .unwrap_or_default()
        );
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
        // https://stripe.com/docs/api/payment_intents/create
        let mut body: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];

        for (key, value) in &request.metadata {
            body.push((format!("metadata[{}]", key), value.clone()));
        }

        let resp = self
            .http
            .post(self.endpoint("/v1/payment_intents")?)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .form(&body)
            .send()
            .await
            .context("stripe request failed")?;
        let resp = Self::ensure_success(resp, "create payment intent").await?;

        let parsed: PaymentIntentResp = resp.json().await?;
        let client_secret = parsed
            .client_secret
            .ok_or_else(|| anyhow::anyhow!("Stripe payment intent client_secret is missing"))?;

        Ok(PaymentIntent {
            id: parsed.id,
            client_secret,
        })
    }
}
