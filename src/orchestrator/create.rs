use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{info, warn};

use crate::db::Sight;
use crate::error::{LocError, LocResult};
use crate::geo::{read_gps, GpsCoordinate};
use crate::layout::{SightLayout, QUERY_IMAGE_NAME};
use crate::pipeline::Stage;
use crate::session;

use super::Orchestrator;

/// One image of a sight's permanent set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    /// File name inside the image set; this is what pairs files refer to.
    pub id: String,
    pub path: PathBuf,
    pub gps: Option<GpsCoordinate>,
}

/// Lists the JPEGs of `image_dir` in name order with their EXIF location.
/// The staged query copy is not a reference image and is left out.
///
/// Blocking.
pub fn collect_reference_images(image_dir: &Path) -> LocResult<Vec<ReferenceImage>> {
    let entries = fs::read_dir(image_dir).map_err(|err| LocError::artifact(image_dir, err))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| LocError::artifact(image_dir, err))?;
        let path = entry.path();
        if !path.is_file() || !is_jpeg(&path) {
            continue;
        }
        let Some(id) = path.file_name().and_then(|name| name.to_str()).map(str::to_string) else {
            warn!("skipping reference image with non UTF-8 name: {}", path.display());
            continue;
        };
        if id == QUERY_IMAGE_NAME {
            continue;
        }

        let gps = match read_gps(&path) {
            Ok(gps) => gps,
            Err(err) => {
                warn!("could not read EXIF of {}: {err:#}", path.display());
                None
            }
        };
        images.push(ReferenceImage { id, path, gps });
    }

    images.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(images)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

impl Orchestrator {
    /// Builds the finished model of `sight_id` from its permanent image set
    /// and registers the references' GPS.
    ///
    /// Re-running overwrites the previous artifacts of the sight. Must not
    /// overlap a localization run on the same sight; nothing enforces that.
    pub async fn run_model_creation(
        &self,
        sight_id: &str,
        references: Vec<ReferenceImage>,
    ) -> LocResult<Sight> {
        if references.iter().all(|reference| reference.gps.is_none()) {
            return Err(LocError::EmptyGpsSet(sight_id.to_string()));
        }

        let started = Instant::now();
        let layout = SightLayout::from_settings(&self.settings, sight_id);
        tokio::fs::create_dir_all(&layout.outputs)
            .await
            .map_err(|err| LocError::artifact(&layout.outputs, err))?;

        info!(
            "building model for {sight_id} from {} reference image(s)",
            references.len()
        );

        {
            let config = self.feature_config();
            let images = layout.images.clone();
            let outputs = layout.outputs.clone();
            self.run_stage(Stage::ExtractFeatures, move |pipeline| {
                pipeline.extract_features(&config, &images, &outputs)
            })
            .await?;
        }

        {
            let config = self.matcher_config();
            let feature_name = self.settings.pipeline.feature_output.clone();
            let sfm_pairs = layout.sfm_pairs.clone();
            let outputs = layout.outputs.clone();
            self.run_stage(Stage::MatchFeatures, move |pipeline| {
                pipeline.match_features(&config, &sfm_pairs, &feature_name, &outputs, true)
            })
            .await?;
        }

        let sfm_model = {
            let layout = layout.clone();
            self.run_stage(Stage::Reconstruct, move |pipeline| {
                pipeline.reconstruct(
                    &layout.sfm_dir,
                    &layout.images,
                    &layout.sfm_pairs,
                    &layout.model_feature_file(),
                    &layout.model_match_file(),
                )
            })
            .await?
        };

        let final_model = {
            let layout = layout.clone();
            self.run_stage(Stage::Triangulate, move |pipeline| {
                pipeline.triangulate(
                    &layout.final_model_dir,
                    &sfm_model,
                    &layout.images,
                    &layout.sfm_pairs,
                    &layout.model_feature_file(),
                    &layout.model_match_file(),
                )
            })
            .await?
        };
        if final_model != layout.final_model {
            warn!(
                "triangulated model landed at {}, localization reads {}",
                final_model.display(),
                layout.final_model.display()
            );
        }

        let samples = references
            .into_iter()
            .map(|reference| (reference.id, reference.gps))
            .collect();
        self.registry.register(sight_id, samples).await?;

        {
            let layout = layout.clone();
            tokio::task::spawn_blocking(move || session::prepare_workspace(&layout))
                .await
                .map_err(|err| {
                    LocError::Storage(anyhow::anyhow!("workspace preparation aborted: {err}"))
                })??;
        }

        info!(
            "model for {sight_id} ready in {}s",
            started.elapsed().as_secs()
        );
        self.registry
            .sight(sight_id)
            .ok_or_else(|| LocError::UnknownSight(sight_id.to_string()))
    }
}
