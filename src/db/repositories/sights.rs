use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, to_i64},
    models::{ReferencePoint, Sight},
    Database,
};
use crate::geo::GpsCoordinate;

fn row_to_sight(row: &Row) -> Result<Sight> {
    let registered_at: String = row.get("registered_at")?;

    Ok(Sight {
        id: row.get("id")?,
        gps: GpsCoordinate::new(row.get("latitude")?, row.get("longitude")?),
        registered_at: parse_datetime(&registered_at, "registered_at")?,
        references: Vec::new(),
    })
}

impl Database {
    /// Writes a sight and swaps in its reference set in one transaction.
    /// A re-registered sight keeps its original position in the listing.
    pub async fn replace_sight(&self, sight: &Sight) -> Result<()> {
        let record = sight.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO sights (id, latitude, longitude, registered_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     registered_at = excluded.registered_at",
                params![
                    record.id,
                    record.gps.latitude,
                    record.gps.longitude,
                    record.registered_at.to_rfc3339(),
                ],
            )?;
            tx.execute(
                "DELETE FROM reference_images WHERE sight_id = ?1",
                params![record.id],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO reference_images (sight_id, image_id, ordinal, latitude, longitude)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (ordinal, reference) in record.references.iter().enumerate() {
                    stmt.execute(params![
                        record.id,
                        reference.image_id,
                        to_i64(ordinal)?,
                        reference.gps.latitude,
                        reference.gps.longitude,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Every registered sight in first-registration order, references
    /// in ordinal order.
    pub async fn load_sights(&self) -> Result<Vec<Sight>> {
        self.execute(|conn| {
            let mut sights = {
                let mut stmt = conn.prepare(
                    "SELECT id, latitude, longitude, registered_at
                     FROM sights
                     ORDER BY rowid ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut sights = Vec::new();
                while let Some(row) = rows.next()? {
                    sights.push(row_to_sight(row)?);
                }
                sights
            };

            let mut references: HashMap<String, Vec<ReferencePoint>> = HashMap::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT sight_id, image_id, latitude, longitude
                     FROM reference_images
                     ORDER BY sight_id, ordinal ASC",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let sight_id: String = row.get("sight_id")?;
                    references
                        .entry(sight_id)
                        .or_default()
                        .push(ReferencePoint {
                            image_id: row.get("image_id")?,
                            gps: GpsCoordinate::new(row.get("latitude")?, row.get("longitude")?),
                        });
                }
            }

            for sight in &mut sights {
                sight.references = references.remove(&sight.id).unwrap_or_default();
            }
            Ok(sights)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sight(id: &str, images: &[(&str, f64, f64)]) -> Sight {
        Sight {
            id: id.to_string(),
            gps: GpsCoordinate::new(10.0, 20.0),
            registered_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            references: images
                .iter()
                .map(|(image_id, lat, lon)| ReferencePoint {
                    image_id: image_id.to_string(),
                    gps: GpsCoordinate::new(*lat, *lon),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn replace_then_load_keeps_order() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("registry.sqlite3")).unwrap();

        db.replace_sight(&sight("B", &[("b2.jpg", 1.0, 1.0), ("b1.jpg", 2.0, 2.0)]))
            .await
            .unwrap();
        db.replace_sight(&sight("A", &[("a1.jpg", 3.0, 3.0)]))
            .await
            .unwrap();

        let loaded = db.load_sights().await.unwrap();
        let ids: Vec<_> = loaded.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["B", "A"]);

        let images: Vec<_> = loaded[0]
            .references
            .iter()
            .map(|r| r.image_id.as_str())
            .collect();
        assert_eq!(images, ["b2.jpg", "b1.jpg"]);
        assert_eq!(loaded[0], sight("B", &[("b2.jpg", 1.0, 1.0), ("b1.jpg", 2.0, 2.0)]));
    }

    #[tokio::test]
    async fn reregistering_swaps_references() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("registry.sqlite3")).unwrap();

        db.replace_sight(&sight("A", &[("old.jpg", 1.0, 1.0)]))
            .await
            .unwrap();
        db.replace_sight(&sight("B", &[])).await.unwrap();
        db.replace_sight(&sight("A", &[("new1.jpg", 1.0, 1.0), ("new2.jpg", 1.0, 1.0)]))
            .await
            .unwrap();

        let loaded = db.load_sights().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "A");
        let images: Vec<_> = loaded[0]
            .references
            .iter()
            .map(|r| r.image_id.as_str())
            .collect();
        assert_eq!(images, ["new1.jpg", "new2.jpg"]);
        assert!(loaded[1].references.is_empty());
    }
}
