//! Vincenty's inverse formula on the WGS-84 ellipsoid.

use std::f64::consts::PI;

/// WGS-84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Mean earth radius in meters, used when the iteration does not converge.
const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;

const MAX_ITERATIONS: usize = 200;

const CONVERGENCE_EPS: f64 = 1e-12;

/// Distance in meters between two `(latitude, longitude)` pairs given in
/// degrees.
///
/// Agrees with the ellipsoidal geodesic to well below a millimeter except
/// for nearly antipodal points, where Vincenty's iteration can fail to
/// converge; those fall back to the great-circle distance on a sphere.
pub fn geodesic_distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let b = (1.0 - WGS84_F) * WGS84_A;
    let l = (lon2 - lon1) * DEG_TO_RAD;
    let u1 = ((1.0 - WGS84_F) * (lat1 * DEG_TO_RAD).tan()).atan();
    let u2 = ((1.0 - WGS84_F) * (lat2 * DEG_TO_RAD).tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();

        if sin_sigma == 0.0 {
            return 0.0;
        }

        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial lines have cos_sq_alpha == 0.
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));

        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m
                            + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if (lambda - previous).abs() < CONVERGENCE_EPS {
            let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - b * b) / (b * b);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));

            return b * big_a * (sigma - delta_sigma);
        }
    }

    haversine_m(from, to)
}

fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + (lat1 * DEG_TO_RAD).cos() * (lat2 * DEG_TO_RAD).cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    MEAN_EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_are_zero_apart() {
        assert_eq!(geodesic_distance_m((48.85, 2.35), (48.85, 2.35)), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_at_equator() {
        // WGS-84 reference value: 110 574.389 m.
        let d = geodesic_distance_m((0.0, 0.0), (1.0, 0.0));
        assert!((d - 110_574.389).abs() < 0.01, "got {d}");
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        // WGS-84 reference value: 111 319.491 m.
        let d = geodesic_distance_m((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111_319.491).abs() < 0.01, "got {d}");
    }

    #[test]
    fn short_urban_distance() {
        // A meridian degree is about 111.2 km near 49N.
        let d = geodesic_distance_m((48.85, 2.35), (48.86, 2.35));
        assert!((d - 1_112.1).abs() < 1.0, "got {d}");
    }

    #[test]
    fn antipodal_points_fall_back_to_sphere() {
        let d = geodesic_distance_m((0.0, 0.0), (0.5, 179.7));
        assert!(d.is_finite());
        assert!(d > 19_900_000.0 && d < 20_050_000.0, "got {d}");
    }
}
