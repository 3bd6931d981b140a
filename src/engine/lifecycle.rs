use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::simulation;
use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, DeliveryStatus};
use crate::models::driver::{Driver, DriverStatus};
use crate::models::tracking::TrackingUpdate;
use crate::notify::NotificationEvent;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: DeliveryStatus,
    pub location: Option<String>,
    pub note: Option<String>,
}

impl StatusChange {
    pub fn to(status: DeliveryStatus) -> Self {
        Self {
            status,
            location: None,
            note: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Changed { from: DeliveryStatus },
    Unchanged,
}

// pending -> in_progress -> picked_up/in_transit -> completed; declined only
// before pickup.
pub fn can_transition(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;

    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Declined)
            | (InProgress, PickedUp)
            | (InProgress, InTransit)
            | (InProgress, Declined)
            | (PickedUp, InTransit)
            | (PickedUp, Completed)
            | (InTransit, Completed)
    )
}

pub fn apply_transition(
    delivery: &mut DeliveryRequest,
    change: &StatusChange,
    enforce: bool,
) -> Result<TransitionOutcome, AppError> {
    let from = delivery.status;
    let to = change.status;

    if from == to {
        return Ok(TransitionOutcome::Unchanged);
    }

    if enforce {
        if !can_transition(from, to) {
            return Err(AppError::Conflict(format!(
                "delivery {} cannot move from {} to {}",
                delivery.tracking_id, from, to
            )));
        }

        if to == DeliveryStatus::Completed && delivery.proof_photo_url.is_none() {
            return Err(AppError::Conflict(format!(
                "delivery {} needs a proof of delivery photo before completion",
                delivery.tracking_id
            )));
        }
    }

    let location = change
        .location
        .clone()
        .filter(|loc| !loc.trim().is_empty())
        .unwrap_or_else(|| default_location(delivery, to));
    let note = change
        .note
        .clone()
        .filter(|note| !note.trim().is_empty())
        .unwrap_or_else(|| default_note(to).to_string());

    delivery.status = to;
    delivery.push_update(TrackingUpdate::new(to.label(), location, note));

    Ok(TransitionOutcome::Changed { from })
}

fn default_location(delivery: &DeliveryRequest, to: DeliveryStatus) -> String {
    match to {
        DeliveryStatus::Completed => delivery.delivery_location.clone(),
        DeliveryStatus::InTransit => format!("En route to {}", delivery.delivery_location),
        _ => delivery.pickup_location.clone(),
    }
}

fn default_note(to: DeliveryStatus) -> &'static str {
    match to {
        DeliveryStatus::Pending => "Request is awaiting dispatch",
        DeliveryStatus::InProgress => "Request accepted by dispatch",
        DeliveryStatus::PickedUp => "Package collected from pickup location",
        DeliveryStatus::InTransit => "Package is on its way",
        DeliveryStatus::Completed => "Package delivered",
        DeliveryStatus::Declined => "Request was declined",
    }
}

pub fn update_status(
    state: &AppState,
    delivery_id: Uuid,
    change: StatusChange,
) -> Result<DeliveryRequest, AppError> {
    let status_label = change.status.as_str();

    let (delivery, outcome) = {
        let mut delivery = state
            .deliveries
            .get_mut(&delivery_id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", delivery_id)))?;

        let outcome = match apply_transition(&mut delivery, &change, state.config.enforce_transitions)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                state
                    .metrics
                    .status_transitions_total
                    .with_label_values(&[status_label, "rejected"])
                    .inc();
                warn!(
                    delivery_id = %delivery_id,
                    from = %delivery.status,
                    to = %change.status,
                    "status transition rejected"
                );
                return Err(err);
            }
        };

        (delivery.clone(), outcome)
    };

    let TransitionOutcome::Changed { from } = outcome else {
        state
            .metrics
            .status_transitions_total
            .with_label_values(&[status_label, "unchanged"])
            .inc();
        return Ok(delivery);
    };

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[status_label, "applied"])
        .inc();

    if delivery.status.is_terminal() {
        simulation::stop(state, delivery_id);
        if let Some(driver_id) = delivery.assigned_driver {
            release_driver(state, driver_id, delivery_id);
        }
    }

    info!(
        delivery_id = %delivery_id,
        tracking_id = %delivery.tracking_id,
        from = %from,
        to = %delivery.status,
        "delivery status changed"
    );

    state
        .notifier
        .try_notify(NotificationEvent::status_changed(&delivery, from));
    state.publish(&delivery);

    Ok(delivery)
}

pub fn release_driver(state: &AppState, driver_id: Uuid, delivery_id: Uuid) {
    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        if driver.current_delivery == Some(delivery_id) {
            driver.current_delivery = None;
            driver.updated_at = Utc::now();
            info!(driver_id = %driver_id, delivery_id = %delivery_id, "driver released");
        }
    }
}

pub fn assign_driver(
    state: &AppState,
    delivery_id: Uuid,
    driver_id: Uuid,
) -> Result<(DeliveryRequest, Driver), AppError> {
    // Driver guard is taken before the delivery guard.
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", driver_id)))?;

    if driver.status != DriverStatus::Active {
        return Err(AppError::Conflict(format!("driver {} is inactive", driver.name)));
    }

    if let Some(current) = driver.current_delivery {
        if current != delivery_id {
            return Err(AppError::Conflict(format!(
                "driver {} already has a current delivery",
                driver.name
            )));
        }
    }

    let mut delivery = state
        .deliveries
        .get_mut(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", delivery_id)))?;

    if delivery.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "delivery {} is already {}",
            delivery.tracking_id, delivery.status
        )));
    }

    let previous_driver = delivery.assigned_driver.filter(|prev| *prev != driver_id);
    let first_assignment = driver.current_delivery.is_none();

    let pickup = delivery.pickup_location.clone();
    delivery.assigned_driver = Some(driver_id);
    delivery.push_update(TrackingUpdate::new(
        "Driver Assigned",
        pickup,
        format!("{} will handle this delivery", driver.name),
    ));

    if delivery.status == DeliveryStatus::Pending {
        apply_transition(
            &mut delivery,
            &StatusChange::to(DeliveryStatus::InProgress),
            state.config.enforce_transitions,
        )?;
        state
            .metrics
            .status_transitions_total
            .with_label_values(&[DeliveryStatus::InProgress.as_str(), "applied"])
            .inc();
    }

    if first_assignment {
        let waited = (Utc::now() - delivery.created_at).num_milliseconds() as f64 / 1000.0;
        driver.record_response(waited);
    }
    driver.current_delivery = Some(delivery_id);
    driver.updated_at = Utc::now();

    let delivery_snapshot = delivery.clone();
    let driver_snapshot = driver.clone();
    drop(delivery);
    drop(driver);
    let delivery = delivery_snapshot;

    if let Some(previous) = previous_driver {
        release_driver(state, previous, delivery_id);
    }

    info!(
        delivery_id = %delivery_id,
        driver_id = %driver_id,
        "driver assigned"
    );

    state
        .notifier
        .try_notify(NotificationEvent::driver_assigned(&delivery, &driver_snapshot));
    state.publish(&delivery);

    Ok((delivery, driver_snapshot))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{apply_transition, can_transition, StatusChange, TransitionOutcome};
    use crate::error::AppError;
    use crate::models::delivery::{DeliveryRequest, DeliveryStatus, Priority};

    fn delivery(status: DeliveryStatus) -> DeliveryRequest {
        DeliveryRequest {
            id: Uuid::new_v4(),
            tracking_id: "MD-TEST2345".to_string(),
            status,
            pickup_location: "St. Mary's Lab".to_string(),
            delivery_location: "Northside Clinic".to_string(),
            pickup_coords: None,
            delivery_coords: None,
            priority: Priority::Normal,
            package_type: "specimen".to_string(),
            requester_name: "Dr. Okafor".to_string(),
            company_name: None,
            contact_phone: None,
            notes: None,
            tracking_updates: Vec::new(),
            assigned_driver: None,
            proof_photo_url: None,
            current_location: None,
            route_progress: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn forward_path_is_allowed() {
        use DeliveryStatus::*;
        assert!(can_transition(Pending, InProgress));
        assert!(can_transition(InProgress, PickedUp));
        assert!(can_transition(PickedUp, InTransit));
        assert!(can_transition(InTransit, Completed));
        assert!(can_transition(Pending, Declined));
    }

    #[test]
    fn backward_and_terminal_moves_are_rejected() {
        use DeliveryStatus::*;
        assert!(!can_transition(InTransit, Pending));
        assert!(!can_transition(Completed, InTransit));
        assert!(!can_transition(Declined, InProgress));
        assert!(!can_transition(Pending, Completed));
        assert!(!can_transition(InTransit, Declined));
    }

    #[test]
    fn transition_appends_tracking_update() {
        let mut d = delivery(DeliveryStatus::Pending);
        let outcome =
            apply_transition(&mut d, &StatusChange::to(DeliveryStatus::InProgress), true).unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Changed {
                from: DeliveryStatus::Pending
            }
        );
        assert_eq!(d.status, DeliveryStatus::InProgress);
        assert_eq!(d.tracking_updates.len(), 1);
        assert_eq!(d.tracking_updates[0].status, "In Progress");
        assert_eq!(d.tracking_updates[0].location, "St. Mary's Lab");
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut d = delivery(DeliveryStatus::InTransit);
        let outcome =
            apply_transition(&mut d, &StatusChange::to(DeliveryStatus::InTransit), true).unwrap();

        assert_eq!(outcome, TransitionOutcome::Unchanged);
        assert!(d.tracking_updates.is_empty());
    }

    #[test]
    fn completion_requires_photo_when_enforced() {
        let mut d = delivery(DeliveryStatus::InTransit);
        let err = apply_transition(&mut d, &StatusChange::to(DeliveryStatus::Completed), true)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        d.proof_photo_url = Some("memory://pod/proofs/x.jpg".to_string());
        apply_transition(&mut d, &StatusChange::to(DeliveryStatus::Completed), true).unwrap();
        assert_eq!(d.status, DeliveryStatus::Completed);
        assert_eq!(d.tracking_updates[0].location, "Northside Clinic");
    }

    #[test]
    fn unenforced_mode_lets_last_writer_win() {
        let mut d = delivery(DeliveryStatus::Completed);
        apply_transition(&mut d, &StatusChange::to(DeliveryStatus::Pending), false).unwrap();
        assert_eq!(d.status, DeliveryStatus::Pending);
    }

    #[test]
    fn caller_supplied_location_and_note_are_kept() {
        let mut d = delivery(DeliveryStatus::InProgress);
        let change = StatusChange {
            status: DeliveryStatus::PickedUp,
            location: Some("Loading dock B".to_string()),
            note: Some("Cold box sealed".to_string()),
        };
        apply_transition(&mut d, &change, true).unwrap();

        let update = d.latest_update().unwrap();
        assert_eq!(update.location, "Loading dock B");
        assert_eq!(update.note, "Cold box sealed");
    }
}
