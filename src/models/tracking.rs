use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingUpdate {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub note: String,
}

impl TrackingUpdate {
    pub fn new(status: impl Into<String>, location: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            timestamp: Utc::now(),
            location: location.into(),
            note: note.into(),
        }
    }

    pub fn display_timestamp(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%b %d, %Y %H:%M UTC").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub delivery_id: Uuid,
    pub tracking_id: String,
    pub status: DeliveryStatus,
    pub current_location: Option<GeoPoint>,
    pub route_progress: Option<f64>,
    pub distance_remaining_km: Option<f64>,
    pub latest_update: Option<TrackingUpdate>,
    pub emitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::format_timestamp;

    #[test]
    fn timestamps_render_for_humans() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "Mar 07, 2024 14:05 UTC");
    }
}
