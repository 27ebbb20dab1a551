//! Request payload codec and pose response encoding.

mod decoder;
pub mod fields;
mod query;
mod response;

use crate::geo::GpsCoordinate;

pub use decoder::decode;
pub use query::{stage_query, StagedQuery};
pub use response::{encode, PoseResult, DEFAULT_POSE};

/// Device roll reported by the client, in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Accepts any multiple of 90, negative values included.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// The sensor's horizontal and vertical axes trade places.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub resolution: (f64, f64),
    pub focal_length: (f64, f64),
    pub principal_point: (f64, f64),
}

impl CameraIntrinsics {
    /// Intrinsics as seen by the rotated image.
    pub fn oriented(self, rotation: Rotation) -> Self {
        if !rotation.swaps_axes() {
            return self;
        }
        let swap = |(a, b): (f64, f64)| (b, a);
        Self {
            resolution: swap(self.resolution),
            focal_length: swap(self.focal_length),
            principal_point: swap(self.principal_point),
        }
    }

    /// One line of a COLMAP queries-with-intrinsics list.
    pub fn colmap_line(&self, image_name: &str) -> String {
        format!(
            "{image_name} PINHOLE {} {} {} {} {} {}",
            self.resolution.0,
            self.resolution.1,
            self.focal_length.0,
            self.focal_length.1,
            self.principal_point.0,
            self.principal_point.1,
        )
    }
}

/// Everything one upload carries. Lives for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    pub rotation: Rotation,
    /// Already oriented for `rotation`.
    pub intrinsics: CameraIntrinsics,
    pub gps: GpsCoordinate,
    /// The embedded JPEG, as uploaded (not yet rotated).
    pub image: Vec<u8>,
}
