use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::driver::GeoPoint;
use crate::models::tracking::{TrackingEvent, TrackingUpdate};

const TRACKING_PREFIX: &str = "MD-";
const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TRACKING_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    PickedUp,
    InTransit,
    Completed,
    Declined,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 6] = [
        DeliveryStatus::Pending,
        DeliveryStatus::InProgress,
        DeliveryStatus::PickedUp,
        DeliveryStatus::InTransit,
        DeliveryStatus::Completed,
        DeliveryStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InProgress => "in_progress",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Declined => "declined",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::InProgress => "In Progress",
            DeliveryStatus::PickedUp => "Picked Up",
            DeliveryStatus::InTransit => "In Transit",
            DeliveryStatus::Completed => "Delivered",
            DeliveryStatus::Declined => "Declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Declined)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown delivery status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub tracking_id: String,
    pub status: DeliveryStatus,
    pub pickup_location: String,
    pub delivery_location: String,
    pub pickup_coords: Option<GeoPoint>,
    pub delivery_coords: Option<GeoPoint>,
    pub priority: Priority,
    pub package_type: String,
    pub requester_name: String,
    pub company_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub tracking_updates: Vec<TrackingUpdate>,
    pub assigned_driver: Option<Uuid>,
    pub proof_photo_url: Option<String>,
    pub current_location: Option<GeoPoint>,
    pub route_progress: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRequest {
    pub fn push_update(&mut self, update: TrackingUpdate) {
        self.updated_at = update.timestamp;
        self.tracking_updates.push(update);
    }

    pub fn latest_update(&self) -> Option<&TrackingUpdate> {
        self.tracking_updates.last()
    }

    pub fn distance_remaining_km(&self) -> Option<f64> {
        match (self.current_location, self.delivery_coords) {
            (Some(current), Some(dest)) => Some(haversine_km(&current, &dest)),
            _ => None,
        }
    }

    pub fn to_event(&self) -> TrackingEvent {
        TrackingEvent {
            delivery_id: self.id,
            tracking_id: self.tracking_id.clone(),
            status: self.status,
            current_location: self.current_location,
            route_progress: self.route_progress,
            distance_remaining_km: self.distance_remaining_km(),
            latest_update: self.latest_update().cloned(),
            emitted_at: Utc::now(),
        }
    }
}

pub fn generate_tracking_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..TRACKING_LEN)
        .map(|_| TRACKING_ALPHABET[rng.gen_range(0..TRACKING_ALPHABET.len())] as char)
        .collect();

    format!("{TRACKING_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::{generate_tracking_id, DeliveryStatus, TRACKING_ALPHABET};

    #[test]
    fn tracking_ids_have_prefix_and_unambiguous_chars() {
        for _ in 0..100 {
            let id = generate_tracking_id();
            assert_eq!(id.len(), 11);
            assert!(id.starts_with("MD-"));
            assert!(id[3..].bytes().all(|b| TRACKING_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("in_transit".parse::<DeliveryStatus>(), Ok(DeliveryStatus::InTransit));
        assert_eq!("Picked Up".parse::<DeliveryStatus>(), Ok(DeliveryStatus::PickedUp));
        assert_eq!("in-progress".parse::<DeliveryStatus>(), Ok(DeliveryStatus::InProgress));
        assert!("lost".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn only_completed_and_declined_are_terminal() {
        let terminal: Vec<_> = DeliveryStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![DeliveryStatus::Completed, DeliveryStatus::Declined]);
    }
}
