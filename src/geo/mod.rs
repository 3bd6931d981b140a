use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn interpolate(from: &GeoPoint, to: &GeoPoint, t: f64) -> GeoPoint {
    if t <= 0.0 {
        return *from;
    }
    if t >= 1.0 {
        return *to;
    }
    GeoPoint {
        lat: from.lat + (to.lat - from.lat) * t,
        lng: from.lng + (to.lng - from.lng) * t,
    }
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, interpolate};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 40.7128,
            lng: -74.0060,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn boston_to_new_york_is_around_306_km() {
        let boston = GeoPoint {
            lat: 42.3601,
            lng: -71.0589,
        };
        let new_york = GeoPoint {
            lat: 40.7128,
            lng: -74.0060,
        };
        let distance = haversine_km(&boston, &new_york);
        assert!((distance - 306.0).abs() < 5.0);
    }

    #[test]
    fn interpolation_hits_endpoints_and_midpoint() {
        let a = GeoPoint { lat: 10.0, lng: 20.0 };
        let b = GeoPoint { lat: 20.0, lng: 40.0 };

        assert_eq!(interpolate(&a, &b, 0.0), a);
        assert_eq!(interpolate(&a, &b, 1.0), b);
        assert_eq!(interpolate(&a, &b, 0.5), GeoPoint { lat: 15.0, lng: 30.0 });
    }

    #[test]
    fn interpolation_clamps_overshoot() {
        let a = GeoPoint { lat: 0.0, lng: 0.0 };
        let b = GeoPoint { lat: 1.0, lng: 1.0 };

        assert_eq!(interpolate(&a, &b, 1.7), b);
        assert_eq!(interpolate(&a, &b, -0.3), a);
    }
}
