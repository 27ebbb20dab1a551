//! GPS coordinates and the distance metric used to pick sights and
//! reference images.
//!
//! Latitude is degrees north (-90 to 90), longitude degrees east
//! (-180 to 180). Distances are meters on the WGS-84 ellipsoid.

mod geodesic;
mod photo_gps;

use serde::{Deserialize, Serialize};

pub use geodesic::geodesic_distance_m;
pub use photo_gps::read_gps;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Geodesic distance to `other` in meters.
    pub fn distance_m(&self, other: &GpsCoordinate) -> f64 {
        geodesic_distance_m(self.as_tuple(), other.as_tuple())
    }

    /// False for NaN or infinite components, which no distance can rank.
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Arithmetic mean of latitudes and longitudes; `None` for an empty input.
    pub fn mean<'a, I>(coords: I) -> Option<GpsCoordinate>
    where
        I: IntoIterator<Item = &'a GpsCoordinate>,
    {
        let (count, lat_sum, lon_sum) = coords
            .into_iter()
            .fold((0usize, 0.0, 0.0), |(n, lat, lon), c| {
                (n + 1, lat + c.latitude, lon + c.longitude)
            });

        if count == 0 {
            return None;
        }

        Some(GpsCoordinate::new(
            lat_sum / count as f64,
            lon_sum / count as f64,
        ))
    }
}

impl From<(f64, f64)> for GpsCoordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}
