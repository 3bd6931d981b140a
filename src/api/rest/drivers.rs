use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    #[serde(default)]
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub address: Option<String>,
    pub location: GeoPoint,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        phone: payload.phone,
        status: DriverStatus::Active,
        address: payload.address,
        location: payload.location,
        current_delivery: None,
        avg_response_secs: None,
        response_samples: 0,
        updated_at: Utc::now(),
    };

    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, "driver registered");
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| a.name.cmp(&b.name));
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    Ok(Json(driver.value().clone()))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    if payload.status == DriverStatus::Inactive && driver.current_delivery.is_some() {
        return Err(AppError::Conflict(format!(
            "driver {} still has a current delivery",
            driver.name
        )));
    }

    driver.status = payload.status;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    driver.location = Some(payload.location);
    if let Some(address) = payload.address {
        driver.address = Some(address);
    }
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}
