use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::AppError;
use crate::otp;
use crate::payments::{PaymentIntent, PaymentIntentRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notify", post(forward_chat_message))
        .route("/api/send-chat-message", post(forward_chat_message))
        .route("/api/submit-request", post(submit_request))
        .route("/api/payments/create-intent", post(create_payment_intent))
        .route("/api/otp/secret", post(provision_otp_secret))
        .route("/api/otp/:user_id", get(otp_status))
}

async fn forward_chat_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let has_text = payload
        .get("text")
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty());
    if !has_text {
        return Err(AppError::BadRequest("text is required".to_string()));
    }

    let client = state
        .chat_webhook
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("chat webhook is not configured".to_string()))?;

    client.forward(&payload).await.map_err(|err| {
        warn!(error = %err, "chat webhook forward failed");
        AppError::Upstream(err.to_string())
    })?;

    Ok(Json(json!({ "success": true })))
}

async fn submit_request(Json(payload): Json<Value>) -> Json<Value> {
    info!("request submission received");
    Json(json!({
        "success": true,
        "received": payload,
    }))
}

#[derive(Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: String,
}

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
        }
    }
}

fn validate_payment(payload: CreatePaymentIntentRequest) -> Result<PaymentIntentRequest, AppError> {
    let amount = payload
        .amount
        .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;
    if amount <= 0 {
        return Err(AppError::BadRequest("amount must be > 0".to_string()));
    }

    let currency = payload
        .currency
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "usd".to_string());
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(format!("invalid currency: {currency}")));
    }

    Ok(PaymentIntentRequest {
        amount,
        currency,
        metadata: payload.metadata,
    })
}

async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let request = validate_payment(payload)?;

    let gateway = state
        .payments
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("payments are not configured".to_string()))?;

    let intent = gateway
        .create_payment_intent(&request)
        .await
        .map_err(|err| AppError::Upstream(err.to_string()))?;

    info!(
        payment_intent = %intent.id,
        amount = request.amount,
        currency = %request.currency,
        "payment intent created"
    );

    Ok(Json(intent.into()))
}

#[derive(Deserialize)]
pub struct ProvisionOtpRequest {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Serialize)]
struct ProvisionOtpResponse {
    user_id: String,
    secret: String,
    otpauth_url: String,
}

async fn provision_otp_secret(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProvisionOtpRequest>,
) -> Result<Json<ProvisionOtpResponse>, AppError> {
    let user_id = payload.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("user_id is required".to_string()));
    }

    let secret = otp::generate_secret();
    let otpauth_url = otp::provisioning_uri(&state.config.otp_issuer, &user_id, &secret)?;
    state.otp_secrets.insert(user_id.clone(), secret.clone());

    info!(user_id = %user_id, "otp secret provisioned");

    Ok(Json(ProvisionOtpResponse {
        user_id,
        secret,
        otpauth_url,
    }))
}

async fn otp_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let enrolled = state.otp_secrets.contains_key(&user_id);
    Json(json!({
        "user_id": user_id,
        "enrolled": enrolled,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{validate_payment, CreatePaymentIntentRequest};

    fn payment(amount: Option<i64>, currency: Option<&str>) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            amount,
            currency: currency.map(str::to_string),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn currency_defaults_to_usd() {
        let req = validate_payment(payment(Some(2500), None)).unwrap();
        assert_eq!(req.currency, "usd");
        assert_eq!(req.amount, 2500);
    }

    #[test]
    fn currency_is_lowercased() {
        let req = validate_payment(payment(Some(100), Some("EUR"))).unwrap();
        assert_eq!(req.currency, "eur");
    }

    #[test]
    fn rejects_bad_amounts_and_currencies() {
        assert!(validate_payment(payment(None, None)).is_err());
        assert!(validate_payment(payment(Some(0), None)).is_err());
        assert!(validate_payment(payment(Some(-5), None)).is_err());
        assert!(validate_payment(payment(Some(100), Some("dollars"))).is_err());
        assert!(validate_payment(payment(Some(100), Some("u$d"))).is_err());
    }
}
