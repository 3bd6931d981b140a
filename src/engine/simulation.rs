use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::lifecycle::{self, StatusChange};
use crate::error::AppError;
use crate::geo::interpolate;
use crate::models::delivery::{DeliveryRequest, DeliveryStatus};
use crate::models::driver::GeoPoint;
use crate::models::tracking::TrackingUpdate;
use crate::state::AppState;

const HALFWAY: f64 = 0.5;

pub struct SimulationHandle {
    run_id: Uuid,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationTick {
    Moved,
    Arrived,
    Stopped,
}

fn route(delivery: &DeliveryRequest) -> Result<(GeoPoint, GeoPoint), AppError> {
    match (delivery.pickup_coords, delivery.delivery_coords) {
        (Some(pickup), Some(dest)) => Ok((pickup, dest)),
        _ => Err(AppError::BadRequest(format!(
            "delivery {} needs pickup and delivery coordinates for live tracking",
            delivery.tracking_id
        ))),
    }
}

pub fn start(state: &Arc<AppState>, delivery_id: Uuid) -> Result<DeliveryRequest, AppError> {
    let snapshot = state
        .deliveries
        .get(&delivery_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", delivery_id)))?;

    route(&snapshot)?;

    match snapshot.status {
        DeliveryStatus::InProgress | DeliveryStatus::PickedUp => {
            lifecycle::update_status(
                state,
                delivery_id,
                StatusChange {
                    status: DeliveryStatus::InTransit,
                    location: None,
                    note: Some("Live tracking started".to_string()),
                },
            )?;
        }
        DeliveryStatus::InTransit => {}
        other => {
            return Err(AppError::Conflict(format!(
                "delivery {} is {} and cannot be tracked live",
                snapshot.tracking_id, other
            )));
        }
    }

    stop(state, delivery_id);
    let delivery = reset_position(state, delivery_id)?;

    // The entry stays locked until the handle is stored, so the new task
    // cannot deregister itself before it is registered.
    let run_id = Uuid::new_v4();
    match state.simulations.entry(delivery_id) {
        Entry::Occupied(mut slot) => {
            let task = tokio::spawn(run(state.clone(), delivery_id, run_id));
            let displaced = slot.insert(SimulationHandle { run_id, task });
            displaced.task.abort();
            debug!(delivery_id = %delivery_id, "replaced concurrently started simulation");
        }
        Entry::Vacant(slot) => {
            let task = tokio::spawn(run(state.clone(), delivery_id, run_id));
            slot.insert(SimulationHandle { run_id, task });
            state.metrics.active_simulations.inc();
        }
    }

    info!(
        delivery_id = %delivery_id,
        tick_ms = state.config.simulation_tick_ms,
        step = state.config.simulation_step,
        "movement simulation started"
    );

    Ok(delivery)
}

pub fn stop(state: &AppState, delivery_id: Uuid) -> bool {
    match state.simulations.remove(&delivery_id) {
        Some((_, handle)) => {
            handle.task.abort();
            state.metrics.active_simulations.dec();
            info!(delivery_id = %delivery_id, "movement simulation stopped");
            true
        }
        None => false,
    }
}

pub fn reset(state: &AppState, delivery_id: Uuid) -> Result<DeliveryRequest, AppError> {
    stop(state, delivery_id);
    reset_position(state, delivery_id)
}

fn reset_position(state: &AppState, delivery_id: Uuid) -> Result<DeliveryRequest, AppError> {
    let delivery = {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", delivery_id)))?;
        let (pickup, _) = route(&delivery)?;

        delivery.current_location = Some(pickup);
        delivery.route_progress = Some(0.0);
        delivery.updated_at = Utc::now();
        delivery.clone()
    };

    state.publish(&delivery);
    Ok(delivery)
}

pub fn advance(state: &AppState, delivery_id: Uuid, step: f64) -> SimulationTick {
    let (delivery, tick) = {
        let Some(mut delivery) = state.deliveries.get_mut(&delivery_id) else {
            return SimulationTick::Stopped;
        };
        if delivery.status != DeliveryStatus::InTransit {
            return SimulationTick::Stopped;
        }
        let Ok((pickup, dest)) = route(&delivery) else {
            return SimulationTick::Stopped;
        };

        let previous = delivery.route_progress.unwrap_or(0.0);
        if previous >= 1.0 {
            return SimulationTick::Arrived;
        }
        let progress = (previous + step).min(1.0);
        let position = interpolate(&pickup, &dest, progress);

        delivery.route_progress = Some(progress);
        delivery.current_location = Some(position);
        delivery.updated_at = Utc::now();

        let tick = if progress >= 1.0 {
            let destination = delivery.delivery_location.clone();
            delivery.push_update(TrackingUpdate::new(
                "Arrived",
                destination,
                "Arrived at destination",
            ));
            SimulationTick::Arrived
        } else {
            if previous < HALFWAY && progress >= HALFWAY {
                delivery.push_update(TrackingUpdate::new(
                    DeliveryStatus::InTransit.label(),
                    format!("{:.5}, {:.5}", position.lat, position.lng),
                    "Halfway to destination",
                ));
            }
            SimulationTick::Moved
        };

        (delivery.clone(), tick)
    };

    debug!(
        delivery_id = %delivery_id,
        progress = delivery.route_progress.unwrap_or_default(),
        "simulation tick"
    );
    state.publish(&delivery);
    tick
}

async fn run(state: Arc<AppState>, delivery_id: Uuid, run_id: Uuid) {
    let mut ticker = interval(Duration::from_millis(state.config.simulation_tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match advance(&state, delivery_id, state.config.simulation_step) {
            SimulationTick::Moved => {}
            SimulationTick::Arrived => {
                info!(delivery_id = %delivery_id, "simulated delivery reached destination");
                break;
            }
            SimulationTick::Stopped => break,
        }
    }

    if state
        .simulations
        .remove_if(&delivery_id, |_, handle| handle.run_id == run_id)
        .is_some()
    {
        state.metrics.active_simulations.dec();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use std::sync::Arc;

    use super::{advance, start, stop, SimulationTick};
    use crate::config::Config;
    use crate::models::delivery::{DeliveryRequest, DeliveryStatus, Priority};
    use crate::models::driver::GeoPoint;
    use crate::state::AppState;

    fn in_transit() -> DeliveryRequest {
        DeliveryRequest {
            id: Uuid::new_v4(),
            tracking_id: "MD-SIMU2345".to_string(),
            status: DeliveryStatus::InTransit,
            pickup_location: "Blood Bank".to_string(),
            delivery_location: "ER Entrance".to_string(),
            pickup_coords: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
            delivery_coords: Some(GeoPoint { lat: 1.0, lng: 2.0 }),
            priority: Priority::Urgent,
            package_type: "blood".to_string(),
            requester_name: "Nurse Patel".to_string(),
            company_name: None,
            contact_phone: None,
            notes: None,
            tracking_updates: Vec::new(),
            assigned_driver: None,
            proof_photo_url: None,
            current_location: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
            route_progress: Some(0.0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn steps_toward_destination_and_logs_milestones() {
        let state = AppState::new(Config::default()).unwrap();
        let d = in_transit();
        let id = d.id;
        state.deliveries.insert(id, d);

        assert_eq!(advance(&state, id, 0.25), SimulationTick::Moved);
        let current = state.deliveries.get(&id).unwrap().current_location.unwrap();
        assert!((current.lat - 0.25).abs() < 1e-9);
        assert!((current.lng - 0.5).abs() < 1e-9);
        assert!(state.deliveries.get(&id).unwrap().tracking_updates.is_empty());

        assert_eq!(advance(&state, id, 0.25), SimulationTick::Moved);
        let halfway = state.deliveries.get(&id).unwrap().clone();
        assert_eq!(halfway.tracking_updates.len(), 1);
        assert_eq!(halfway.tracking_updates[0].note, "Halfway to destination");

        assert_eq!(advance(&state, id, 0.75), SimulationTick::Arrived);
        let arrived = state.deliveries.get(&id).unwrap().clone();
        assert_eq!(arrived.current_location, Some(GeoPoint { lat: 1.0, lng: 2.0 }));
        assert_eq!(arrived.route_progress, Some(1.0));
        assert_eq!(arrived.latest_update().unwrap().note, "Arrived at destination");
        assert_eq!(arrived.status, DeliveryStatus::InTransit);
    }

    #[tokio::test]
    async fn stops_when_delivery_leaves_transit() {
        let state = AppState::new(Config::default()).unwrap();
        let mut d = in_transit();
        d.status = DeliveryStatus::Declined;
        let id = d.id;
        state.deliveries.insert(id, d);

        assert_eq!(advance(&state, id, 0.1), SimulationTick::Stopped);
        assert_eq!(advance(&state, Uuid::new_v4(), 0.1), SimulationTick::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_leave_one_running_task() {
        let config = Config {
            simulation_tick_ms: 60_000,
            ..Config::default()
        };
        let state = Arc::new(AppState::new(config).unwrap());
        let d = in_transit();
        let id = d.id;
        state.deliveries.insert(id, d);

        for _ in 0..20 {
            let starts: Vec<_> = (0..8)
                .map(|_| {
                    let state = state.clone();
                    tokio::spawn(async move { start(&state, id).map(|_| ()) })
                })
                .collect();
            for handle in starts {
                handle.await.unwrap().unwrap();
            }

            assert_eq!(state.simulations.len(), 1);
            assert_eq!(state.metrics.active_simulations.get(), 1);
        }

        assert!(stop(&state, id));
        assert!(state.simulations.is_empty());
        assert_eq!(state.metrics.active_simulations.get(), 0);
    }
}
