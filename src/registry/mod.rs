//! Sight registry: which landmark a query belongs to, and which of its
//! reference images are worth matching against.
//!
//! The SQLite file is the durable copy. Everything is loaded into memory
//! on open and every read is served from there; `register` persists first
//! and then swaps the in-memory entry, so readers observe either the old
//! or the new reference set of a sight, never a mix.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::info;

use crate::db::{Database, ReferencePoint, Sight};
use crate::error::{LocError, LocResult};
use crate::geo::GpsCoordinate;

/// One reference image as handed to `register`; `gps` is `None` when the
/// image carried no usable location.
pub type GpsSample = (String, Option<GpsCoordinate>);

pub struct SightRegistry {
    db: Database,
    sights: RwLock<Vec<Sight>>,
}

impl SightRegistry {
    pub async fn open(db: Database) -> LocResult<Self> {
        let sights = db.load_sights().await?;
        info!(
            "Loaded {} registered sight(s) from {}",
            sights.len(),
            db.path().display()
        );
        Ok(Self {
            db,
            sights: RwLock::new(sights),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Sight>> {
        match self.sights.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Sight>> {
        match self.sights.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records the GPS-tagged samples of `sight_id` and returns their mean.
    /// Samples without GPS are skipped; if none remain the call fails with
    /// `EmptyGpsSet`. Re-registering replaces the previous reference set.
    pub async fn register(
        &self,
        sight_id: &str,
        samples: Vec<GpsSample>,
    ) -> LocResult<GpsCoordinate> {
        let references: Vec<ReferencePoint> = samples
            .into_iter()
            .filter_map(|(image_id, gps)| gps.map(|gps| ReferencePoint { image_id, gps }))
            .collect();

        let mean = GpsCoordinate::mean(references.iter().map(|r| &r.gps))
            .ok_or_else(|| LocError::EmptyGpsSet(sight_id.to_string()))?;

        let sight = Sight {
            id: sight_id.to_string(),
            gps: mean,
            registered_at: Utc::now(),
            references,
        };
        self.db.replace_sight(&sight).await?;

        let mut sights = self.write();
        match sights.iter_mut().find(|existing| existing.id == sight.id) {
            Some(existing) => *existing = sight,
            None => sights.push(sight),
        }

        info!(
            "Registered sight {sight_id} at ({:.6}, {:.6})",
            mean.latitude, mean.longitude
        );
        Ok(mean)
    }

    /// The registered sight nearest to `query`. Equidistant sights resolve
    /// to the one registered first.
    pub fn select_sight(&self, query: &GpsCoordinate) -> LocResult<String> {
        let sights = self.read();
        let mut nearest: Option<(&Sight, f64)> = None;
        for sight in sights.iter() {
            let distance = sight.gps.distance_m(query);
            match nearest {
                Some((_, best)) if best <= distance => {}
                _ => nearest = Some((sight, distance)),
            }
        }

        nearest
            .map(|(sight, _)| sight.id.clone())
            .ok_or(LocError::NoSightsRegistered)
    }

    /// Up to `k` reference images of `sight_id`, nearest first, with their
    /// distance to `query` in meters. Ties keep registration order.
    pub fn rank_reference_images(
        &self,
        sight_id: &str,
        query: &GpsCoordinate,
        k: usize,
    ) -> LocResult<Vec<(String, f64)>> {
        let sights = self.read();
        let sight = sights
            .iter()
            .find(|sight| sight.id == sight_id)
            .ok_or_else(|| LocError::UnknownSight(sight_id.to_string()))?;

        let mut ranked: Vec<(String, f64)> = sight
            .references
            .iter()
            .map(|reference| (reference.image_id.clone(), reference.gps.distance_m(query)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k);
        Ok(ranked)
    }

    pub fn sight(&self, sight_id: &str) -> Option<Sight> {
        self.read().iter().find(|sight| sight.id == sight_id).cloned()
    }

    pub fn contains(&self, sight_id: &str) -> bool {
        self.read().iter().any(|sight| sight.id == sight_id)
    }

    /// Snapshot of every sight in registration order.
    pub fn sights(&self) -> Vec<Sight> {
        self.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
