use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub status: DriverStatus,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    pub current_delivery: Option<Uuid>,
    pub avg_response_secs: Option<f64>,
    pub response_samples: u32,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn record_response(&mut self, secs: f64) {
        let secs = secs.max(0.0);
        let n = self.response_samples as f64;
        let mean = self.avg_response_secs.unwrap_or(0.0);

        self.avg_response_secs = Some((mean * n + secs) / (n + 1.0));
        self.response_samples = self.response_samples.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Driver, DriverStatus};

    fn driver() -> Driver {
        Driver {
            id: Uuid::new_v4(),
            name: "Rosa".to_string(),
            phone: None,
            status: DriverStatus::Active,
            address: None,
            location: None,
            current_delivery: None,
            avg_response_secs: None,
            response_samples: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn response_time_is_a_running_mean() {
        let mut d = driver();
        d.record_response(60.0);
        d.record_response(120.0);
        d.record_response(180.0);

        assert_eq!(d.response_samples, 3);
        assert!((d.avg_response_secs.unwrap() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn negative_samples_count_as_zero() {
        let mut d = driver();
        d.record_response(-5.0);
        assert_eq!(d.avg_response_secs, Some(0.0));
    }
}
