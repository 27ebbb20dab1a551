use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
    time::Instant,
};

use log::{debug, info};

use super::{LocalizationPipeline, Stage, StageConfig, StageError, StageResult};
use crate::settings::PipelineSettings;

/// Runs each stage as `<program> -m hloc.<module> --flag value ...`.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    colmap_path: String,
}

impl CommandPipeline {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            program: settings.program.clone(),
            colmap_path: settings.colmap_path.clone(),
        }
    }

    fn run(&self, stage: Stage, module: &str, inputs: &[&Path], args: Vec<(&str, OsString)>) -> StageResult {
        for input in inputs {
            if !input.exists() {
                return Err(StageError::MissingFile(input.to_path_buf()));
            }
        }

        let mut command = Command::new(&self.program);
        command.arg("-m").arg(module);
        for (flag, value) in args {
            command.arg(flag);
            if !value.is_empty() {
                command.arg(value);
            }
        }

        debug!("stage {stage}: {command:?}");
        let started = Instant::now();
        let status = command.status()?;

        if !status.success() {
            return Err(StageError::Failed(format!("{module} exited with {status}")));
        }

        info!(
            "stage {stage} finished in {}ms",
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

fn path_arg(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}

impl LocalizationPipeline for CommandPipeline {
    fn extract_features(&self, config: &StageConfig, image_dir: &Path, output_dir: &Path) -> StageResult {
        self.run(
            Stage::ExtractFeatures,
            "hloc.extract_features",
            &[image_dir],
            vec![
                ("--conf", config.name.clone().into()),
                ("--image_dir", path_arg(image_dir)),
                ("--export_dir", path_arg(output_dir)),
            ],
        )
    }

    fn match_features(
        &self,
        config: &StageConfig,
        pairs_file: &Path,
        feature_name: &str,
        output_dir: &Path,
        exhaustive: bool,
    ) -> StageResult {
        let mut args = vec![
            ("--conf", config.name.clone().into()),
            ("--pairs", path_arg(pairs_file)),
            ("--features", feature_name.into()),
            ("--export_dir", path_arg(output_dir)),
        ];
        if exhaustive {
            args.push(("--exhaustive", OsString::new()));
        }

        // Exhaustive matching writes its own pairs list.
        let inputs: &[&Path] = if exhaustive { &[] } else { &[pairs_file] };
        self.run(Stage::MatchFeatures, "hloc.match_features", inputs, args)
    }

    fn reconstruct(
        &self,
        output_dir: &Path,
        image_dir: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
    ) -> StageResult<PathBuf> {
        self.run(
            Stage::Reconstruct,
            "hloc.reconstruction",
            &[image_dir, pairs_file, feature_file, match_file],
            vec![
                ("--sfm_dir", path_arg(output_dir)),
                ("--image_dir", path_arg(image_dir)),
                ("--pairs", path_arg(pairs_file)),
                ("--features", path_arg(feature_file)),
                ("--matches", path_arg(match_file)),
            ],
        )?;
        Ok(output_dir.join("models").join("0"))
    }

    fn triangulate(
        &self,
        model_output_dir: &Path,
        reference_model: &Path,
        image_dir: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
    ) -> StageResult<PathBuf> {
        self.run(
            Stage::Triangulate,
            "hloc.triangulation",
            &[reference_model, image_dir, pairs_file, feature_file, match_file],
            vec![
                ("--sfm_dir", path_arg(model_output_dir)),
                ("--reference_sfm_model", path_arg(reference_model)),
                ("--image_dir", path_arg(image_dir)),
                ("--pairs", path_arg(pairs_file)),
                ("--features", path_arg(feature_file)),
                ("--matches", path_arg(match_file)),
                ("--colmap_path", self.colmap_path.clone().into()),
            ],
        )?;
        Ok(model_output_dir.join("model"))
    }

    fn localize(
        &self,
        model: &Path,
        intrinsics_file: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
        result_file: &Path,
    ) -> StageResult {
        self.run(
            Stage::Localize,
            "hloc.localize_sfm",
            &[model, intrinsics_file, pairs_file, feature_file, match_file],
            vec![
                ("--reference_sfm", path_arg(model)),
                ("--queries", path_arg(intrinsics_file)),
                ("--retrieval", path_arg(pairs_file)),
                ("--features", path_arg(feature_file)),
                ("--matches", path_arg(match_file)),
                ("--results", path_arg(result_file)),
            ],
        )
    }

    fn visualize(
        &self,
        result_file: &Path,
        image_dir: &Path,
        model: &Path,
        top_k: usize,
        output_dir: &Path,
    ) -> StageResult {
        self.run(
            Stage::Visualize,
            "hloc.visualization",
            &[result_file, image_dir, model],
            vec![
                ("--results", path_arg(result_file)),
                ("--image_dir", path_arg(image_dir)),
                ("--reconstruction", path_arg(model)),
                ("--top_k_db", top_k.to_string().into()),
                ("--output", path_arg(output_dir)),
            ],
        )
    }
}
