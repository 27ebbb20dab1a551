//! Rows of the sight registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::GpsCoordinate;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePoint {
    pub image_id: String,
    pub gps: GpsCoordinate,
}

/// A sight as persisted: its representative coordinate and the GPS-tagged
/// reference images in registration order. Serialized for `sights --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sight {
    pub id: String,
    pub gps: GpsCoordinate,
    pub registered_at: DateTime<Utc>,
    pub references: Vec<ReferencePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn serializes_with_camel_case_keys() {
        let sight = Sight {
            id: "Tower".into(),
            gps: GpsCoordinate::new(48.5, 2.25),
            registered_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            references: vec![ReferencePoint {
                image_id: "a.jpg".into(),
                gps: GpsCoordinate::new(48.5, 2.25),
            }],
        };

        assert_eq!(
            serde_json::to_value(&sight).unwrap(),
            json!({
                "id": "Tower",
                "gps": {"latitude": 48.5, "longitude": 2.25},
                "registeredAt": "2024-05-01T12:00:00Z",
                "references": [
                    {"imageId": "a.jpg", "gps": {"latitude": 48.5, "longitude": 2.25}}
                ]
            })
        );
    }
}
