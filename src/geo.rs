/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// Haversine great-circle distance in miles between two points given in degrees.
///
/// Returns `None` when any input is NaN or infinite so that a bad coordinate
/// never leaks a NaN into ranking.
pub fn distance_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> Option<f64> {
    if ![lat1, lng1, lat2, lng2].iter().all(|v| v.is_finite()) {
        return None;
    }

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // rounding can push `a` a hair past 1 for antipodal points
    let distance = 2.0 * EARTH_RADIUS_MILES * a.clamp(0.0, 1.0).sqrt().asin();

    distance.is_finite().then_some(distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ST_LOUIS: (f64, f64) = (38.6270, -90.1994);
    const KANSAS_CITY: (f64, f64) = (39.0997, -94.5786);

    #[test]
    fn identical_points_are_zero() {
        assert_eq!(distance_miles(0.0, 0.0, 0.0, 0.0), Some(0.0));
        assert_eq!(
            distance_miles(ST_LOUIS.0, ST_LOUIS.1, ST_LOUIS.0, ST_LOUIS.1),
            Some(0.0)
        );
    }

    #[test]
    fn rejects_non_finite_input() {
        assert_eq!(distance_miles(f64::NAN, 0.0, 0.0, 0.0), None);
        assert_eq!(distance_miles(0.0, f64::INFINITY, 0.0, 0.0), None);
        assert_eq!(distance_miles(0.0, 0.0, f64::NEG_INFINITY, 0.0), None);
        assert_eq!(distance_miles(0.0, 0.0, 0.0, f64::NAN), None);
    }

    #[test]
    fn symmetric() {
        let there = distance_miles(ST_LOUIS.0, ST_LOUIS.1, KANSAS_CITY.0, KANSAS_CITY.1)
            .expect("finite distance");
        let back = distance_miles(KANSAS_CITY.0, KANSAS_CITY.1, ST_LOUIS.0, ST_LOUIS.1)
            .expect("finite distance");
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn st_louis_to_kansas_city() {
        let miles = distance_miles(ST_LOUIS.0, ST_LOUIS.1, KANSAS_CITY.0, KANSAS_CITY.1)
            .expect("finite distance");
        assert!((miles - 238.0).abs() < 5.0, "got {miles}");
    }

    #[test]
    fn antipodes_are_half_the_circumference() {
        let miles = distance_miles(0.0, 0.0, 0.0, 180.0).expect("finite distance");
        assert!((miles - std::f64::consts::PI * EARTH_RADIUS_MILES).abs() < 1e-6);
    }
}
