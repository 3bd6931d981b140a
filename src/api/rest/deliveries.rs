use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{self, StatusChange};
use crate::engine::simulation;
use crate::error::AppError;
use crate::models::delivery::{generate_tracking_id, DeliveryRequest, DeliveryStatus, Priority};
use crate::models::driver::GeoPoint;
use crate::models::tracking::TrackingUpdate;
use crate::notify::NotificationEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", patch(update_delivery_status))
        .route("/deliveries/:id/tracking", post(append_tracking_update))
        .route("/deliveries/:id/assign", post(assign_driver))
        .route(
            "/deliveries/:id/simulation",
            post(start_simulation).delete(stop_simulation),
        )
        .route("/deliveries/:id/simulation/reset", post(reset_simulation))
        .route("/track/:tracking_id", get(track_delivery))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    #[serde(default)]
    pub pickup_location: String,
    #[serde(default)]
    pub delivery_location: String,
    pub pickup_coords: Option<GeoPoint>,
    pub delivery_coords: Option<GeoPoint>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub package_type: String,
    #[serde(default)]
    pub requester_name: String,
    pub company_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ListDeliveriesQuery {
    pub status: Option<String>,
    pub priority: Option<Priority>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
    pub location: Option<String>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct AppendTrackingRequest {
    #[serde(default)]
    pub status_label: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn reserve_tracking_id(state: &AppState, delivery_id: Uuid) -> String {
    loop {
        let candidate = generate_tracking_id();
        if let Entry::Vacant(slot) = state.tracking_index.entry(candidate.clone()) {
            slot.insert(delivery_id);
            return candidate;
        }
    }
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let pickup_location = required("pickup_location", &payload.pickup_location)?;
    let delivery_location = required("delivery_location", &payload.delivery_location)?;
    let package_type = required("package_type", &payload.package_type)?;
    let requester_name = required("requester_name", &payload.requester_name)?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut delivery = DeliveryRequest {
        id,
        tracking_id: reserve_tracking_id(&state, id),
        status: DeliveryStatus::Pending,
        pickup_location,
        delivery_location,
        pickup_coords: payload.pickup_coords,
        delivery_coords: payload.delivery_coords,
        priority: payload.priority,
        package_type,
        requester_name,
        company_name: optional_text(payload.company_name),
        contact_phone: optional_text(payload.contact_phone),
        notes: optional_text(payload.notes),
        tracking_updates: Vec::new(),
        assigned_driver: None,
        proof_photo_url: None,
        current_location: None,
        route_progress: None,
        created_at: now,
        updated_at: now,
    };
    delivery.push_update(TrackingUpdate::new(
        "Request Submitted",
        delivery.pickup_location.clone(),
        "Delivery request received",
    ));

    state.deliveries.insert(id, delivery.clone());
    state
        .metrics
        .deliveries_created_total
        .with_label_values(&[delivery.priority.as_str()])
        .inc();

    info!(
        delivery_id = %id,
        tracking_id = %delivery.tracking_id,
        priority = delivery.priority.as_str(),
        "delivery request created"
    );

    state
        .notifier
        .try_notify(NotificationEvent::request_created(&delivery));
    state.publish(&delivery);

    Ok(Json(delivery))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryRequest>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<DeliveryStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let mut deliveries: Vec<DeliveryRequest> = state
        .deliveries
        .iter()
        .filter(|entry| status.is_none_or(|s| entry.status == s))
        .filter(|entry| query.priority.is_none_or(|p| entry.priority == p))
        .map(|entry| entry.value().clone())
        .collect();

    deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(deliveries))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let delivery = state
        .deliveries
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))?;

    Ok(Json(delivery.value().clone()))
}

async fn track_delivery(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let normalized = tracking_id.trim().to_ascii_uppercase();
    let id = state
        .tracking_index
        .get(&normalized)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("tracking id {} not found", tracking_id)))?;

    get_delivery(State(state), Path(id)).await
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let status = payload
        .status
        .parse::<DeliveryStatus>()
        .map_err(AppError::BadRequest)?;

    let delivery = lifecycle::update_status(
        &state,
        id,
        StatusChange {
            status,
            location: payload.location,
            note: payload.note,
        },
    )?;

    Ok(Json(delivery))
}

async fn append_tracking_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendTrackingRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let label = required("status_label", &payload.status_label)?;

    let delivery = {
        let mut delivery = state
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))?;

        let location = if payload.location.trim().is_empty() {
            delivery.pickup_location.clone()
        } else {
            payload.location.trim().to_string()
        };
        delivery.push_update(TrackingUpdate::new(label, location, payload.note.trim()));
        delivery.clone()
    };

    state.publish(&delivery);
    Ok(Json(delivery))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let (delivery, _driver) = lifecycle::assign_driver(&state, id, payload.driver_id)?;
    Ok(Json(delivery))
}

async fn start_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(simulation::start(&state, id)?))
}

async fn reset_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    Ok(Json(simulation::reset(&state, id)?))
}

async fn stop_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, AppError> {
    simulation::stop(&state, id);
    get_delivery(State(state), Path(id)).await
}
