pub mod deliveries;
pub mod drivers;
pub mod integrations;
pub mod photos;
pub mod ws;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::models::delivery::{DeliveryStatus, Priority};
use crate::models::driver::DriverStatus;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let max_photo_bytes = state.config.max_photo_bytes;

    Router::new()
        .merge(deliveries::router())
        .merge(drivers::router())
        .merge(integrations::router())
        .merge(photos::router(max_photo_bytes))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/dashboard/summary", get(dashboard_summary))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    deliveries: usize,
    drivers: usize,
    simulations: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        deliveries: state.deliveries.len(),
        drivers: state.drivers.len(),
        simulations: state.simulations.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Serialize)]
struct DashboardSummary {
    total: usize,
    by_status: BTreeMap<&'static str, usize>,
    urgent_open: usize,
    drivers_total: usize,
    drivers_active: usize,
    drivers_busy: usize,
}

async fn dashboard_summary(State(state): State<Arc<AppState>>) -> Json<DashboardSummary> {
    let mut by_status: BTreeMap<&'static str, usize> = DeliveryStatus::ALL
        .into_iter()
        .map(|status| (status.as_str(), 0))
        .collect();
    let mut urgent_open = 0;

    for entry in state.deliveries.iter() {
        *by_status.entry(entry.status.as_str()).or_default() += 1;
        if entry.priority == Priority::Urgent && !entry.status.is_terminal() {
            urgent_open += 1;
        }
    }

    let (drivers_active, drivers_busy) =
        state
            .drivers
            .iter()
            .fold((0, 0), |(active, busy), entry| {
                (
                    active + usize::from(entry.status == DriverStatus::Active),
                    busy + usize::from(entry.current_delivery.is_some()),
                )
            });

    Json(DashboardSummary {
        total: state.deliveries.len(),
        by_status,
        urgent_open,
        drivers_total: state.drivers.len(),
        drivers_active,
        drivers_busy,
    })
}
