use geographiclib_rs::{Geodesic, InverseGeodesic};

/// Geodesic distance in kilometres between two `(latitude, longitude)`
/// points on the WGS-84 ellipsoid.
pub fn segment_km(geodesic: &Geodesic, from: (f64, f64), to: (f64, f64)) -> f64 {
    let metres: f64 = geodesic.inverse(from.0, from.1, to.0, to.1);
    metres / 1000.0
}

/// Sum of the distances between consecutive points, in the order given,
/// rounded to metres. A single point travels nowhere.
pub fn cumulative_distance_km<I>(points: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let geodesic = Geodesic::wgs84();
    let mut points = points.into_iter();
    let Some(mut previous) = points.next() else {
        return 0.0;
    };

    let mut total = 0.0;
    for point in points {
        total += segment_km(&geodesic, previous, point);
        previous = point;
    }

    round_to(total, 3)
}

/// Rounds half away from zero at the given number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_point_route() {
        let points = vec![(18.5196, 73.8554), (17.2894, 74.1818), (16.7050, 74.2433)];
        assert_eq!(cumulative_distance_km(points), 205.487);
    }

    #[test]
    fn single_point_is_zero() {
        assert_eq!(cumulative_distance_km(vec![(18.5196, 73.8554)]), 0.0);
    }

    #[test]
    fn no_points_is_zero() {
        assert_eq!(cumulative_distance_km(Vec::new()), 0.0);
    }

    #[test]
    fn pune_to_mumbai() {
        let points = vec![(18.5204, 73.8567), (19.0760, 72.8777)];
        assert_eq!(cumulative_distance_km(points), 120.138);
    }

    #[test]
    fn order_changes_the_total() {
        let forward = vec![(18.5196, 73.8554), (17.2894, 74.1818), (16.7050, 74.2433)];
        let shuffled = vec![(18.5196, 73.8554), (16.7050, 74.2433), (17.2894, 74.1818)];
        assert!(cumulative_distance_km(shuffled) > cumulative_distance_km(forward));
    }

    #[test]
    fn repeated_point_adds_nothing() {
        let points = vec![(10.0, 10.0), (10.0, 10.0), (10.0, 10.0)];
        assert_eq!(cumulative_distance_km(points), 0.0);
    }

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(0.000135, 3), 0.0);
        assert_eq!(round_to(-1.23449, 3), -1.234);
    }
}
