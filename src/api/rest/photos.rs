use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::DeliveryRequest;
use crate::models::tracking::TrackingUpdate;
use crate::notify::NotificationEvent;
use crate::state::AppState;
use crate::storage::proof_object_key;

pub fn router(max_photo_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().route(
        "/deliveries/:id/proof",
        put(upload_proof)
            .get(get_proof)
            .layer(DefaultBodyLimit::max(max_photo_bytes)),
    )
}

#[derive(Serialize)]
struct ProofResponse {
    delivery_id: Uuid,
    url: Option<String>,
    exists: bool,
}

fn image_content_type(headers: &HeaderMap) -> Result<String, AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .unwrap_or_default();

    if !content_type.to_ascii_lowercase().starts_with("image/") {
        return Err(AppError::UnsupportedMediaType(format!(
            "proof of delivery must be an image, got {:?}",
            content_type
        )));
    }
    Ok(content_type)
}

async fn upload_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let content_type = image_content_type(&headers)?;

    let limit = state.config.max_photo_bytes;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(format!("photo exceeds the {limit} byte limit"))
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;
    if body.is_empty() {
        return Err(AppError::BadRequest("photo body is empty".to_string()));
    }

    if !state.deliveries.contains_key(&id) {
        return Err(AppError::NotFound(format!("delivery {} not found", id)));
    }

    let key = proof_object_key(id, &content_type);
    let size = body.len();
    state
        .photos
        .upload(&key, body, &content_type)
        .await
        .map_err(|err| AppError::Upstream(format!("photo upload failed: {err}")))?;
    let url = state.photos.public_url(&key);

    let delivery = {
        let mut delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))?;

        let destination = delivery.delivery_location.clone();
        delivery.proof_photo_url = Some(url);
        delivery.push_update(TrackingUpdate::new(
            "Proof of Delivery",
            destination,
            "Proof of delivery photo uploaded",
        ));
        delivery.clone()
    };

    info!(delivery_id = %id, key = %key, bytes = size, "proof of delivery stored");

    state
        .notifier
        .try_notify(NotificationEvent::proof_uploaded(&delivery));
    state.publish(&delivery);

    Ok(Json(delivery))
}

async fn get_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProofResponse>, AppError> {
    let url = state
        .deliveries
        .get(&id)
        .map(|entry| entry.proof_photo_url.clone())
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))?;

    let exists = match &url {
        Some(url) => {
            let prefix = state.photos.public_url("");
            let key = url.strip_prefix(prefix.as_str()).unwrap_or(url.as_str());
            state.photos.exists(key).await.unwrap_or_else(|err| {
                warn!(delivery_id = %id, error = %err, "photo existence check failed");
                false
            })
        }
        None => false,
    };

    Ok(Json(ProofResponse {
        delivery_id: id,
        url,
        exists,
    }))
}
