//! Every path the core hands to the external pipeline for one sight.

use std::path::{Path, PathBuf};

use crate::settings::{PipelineSettings, ServiceSettings};

pub const QUERY_IMAGE_NAME: &str = "query_image.jpg";

const INTRINSICS_FILE_NAME: &str = "queries_with_intrinsics.txt";

#[derive(Debug, Clone, PartialEq)]
pub struct SightLayout {
    pub sight_id: String,
    /// Permanent reference-image set.
    pub images: PathBuf,
    pub query_images: PathBuf,
    pub query_image: PathBuf,
    /// Copy of the query inside the permanent set, needed for matching.
    pub dataset_query_image: PathBuf,
    pub intrinsics_dir: PathBuf,
    pub intrinsics_file: PathBuf,
    pub localization_pairs: PathBuf,
    /// Immutable artifacts of the finished model live here.
    pub outputs: PathBuf,
    /// Session scratch area.
    pub localization_dir: PathBuf,
    pub sfm_pairs: PathBuf,
    pub sfm_dir: PathBuf,
    pub reference_sfm: PathBuf,
    pub final_model_dir: PathBuf,
    pub final_model: PathBuf,
    pub feature_file_name: String,
    pub match_file_name: String,
}

impl SightLayout {
    pub fn new(
        datasets_root: &Path,
        outputs_root: &Path,
        sight_id: &str,
        pipeline: &PipelineSettings,
    ) -> Self {
        let dataset = datasets_root.join(sight_id);
        let images = dataset.join("images");
        let query_images = dataset.join("query_images");
        let intrinsics_dir = dataset.join("camera_intrinsics");
        let outputs = outputs_root.join(sight_id);
        let sfm_dir = outputs.join("sfm_superpoint+superglue");
        let final_model_dir = outputs.join("final_model");

        Self {
            sight_id: sight_id.to_string(),
            query_image: query_images.join(QUERY_IMAGE_NAME),
            dataset_query_image: images.join(QUERY_IMAGE_NAME),
            intrinsics_file: intrinsics_dir.join(INTRINSICS_FILE_NAME),
            localization_pairs: dataset.join("localization_pairs.txt"),
            localization_dir: outputs.join("localization"),
            sfm_pairs: outputs.join("pairs-exhaustive.txt"),
            reference_sfm: sfm_dir.join("models").join("0"),
            final_model: final_model_dir.join("model"),
            feature_file_name: pipeline.feature_file_name(),
            match_file_name: pipeline.match_file_name(),
            images,
            query_images,
            intrinsics_dir,
            outputs,
            sfm_dir,
            final_model_dir,
        }
    }

    pub fn from_settings(settings: &ServiceSettings, sight_id: &str) -> Self {
        Self::new(
            &settings.datasets_root,
            &settings.outputs_root,
            sight_id,
            &settings.pipeline,
        )
    }

    pub fn model_feature_file(&self) -> PathBuf {
        self.outputs.join(&self.feature_file_name)
    }

    pub fn model_match_file(&self) -> PathBuf {
        self.outputs.join(&self.match_file_name)
    }

    pub fn scratch_feature_file(&self) -> PathBuf {
        self.localization_dir.join(&self.feature_file_name)
    }

    pub fn scratch_match_file(&self) -> PathBuf {
        self.localization_dir.join(&self.match_file_name)
    }

    /// `<localization>/<stamp>_<sight>`
    pub fn result_file(&self, run_stamp: &str) -> PathBuf {
        self.localization_dir
            .join(format!("{run_stamp}_{}", self.sight_id))
    }

    pub fn visualization_dir(&self, run_stamp: &str) -> PathBuf {
        self.localization_dir.join(run_stamp)
    }

    /// Pairs of (immutable copy, session scratch copy) reset by maintenance.
    pub fn matcher_artifacts(&self) -> [(PathBuf, PathBuf); 2] {
        [
            (self.model_feature_file(), self.scratch_feature_file()),
            (self.model_match_file(), self.scratch_match_file()),
        ]
    }
}
