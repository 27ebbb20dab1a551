use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Names the external pipeline uses for its feature/matcher configurations
/// and for the artifact files they produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub program: String,
    pub feature_config: String,
    pub feature_output: String,
    pub matcher_config: String,
    pub matcher_output: String,
    pub colmap_path: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            feature_config: "superpoint_real_time".into(),
            feature_output: "feats-superpoint-rt".into(),
            matcher_config: "superglue_real_time".into(),
            matcher_output: "matches-superglue-rt".into(),
            colmap_path: "colmap".into(),
        }
    }
}

impl PipelineSettings {
    /// `<feature_output>.h5`
    pub fn feature_file_name(&self) -> String {
        format!("{}.h5", self.feature_output)
    }

    /// `<feature_output>_<matcher_output>.h5`
    pub fn match_file_name(&self) -> String {
        format!("{}_{}.h5", self.feature_output, self.matcher_output)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    pub bind_address: String,
    pub datasets_root: PathBuf,
    pub outputs_root: PathBuf,
    pub registry_file: PathBuf,
    pub cleanup_interval_secs: u64,
    /// How many GPS-nearest reference images a query is matched against.
    pub number_of_matches: usize,
    pub max_payload_bytes: usize,
    pub pipeline: PipelineSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:40020".into(),
            datasets_root: PathBuf::from("datasets"),
            outputs_root: PathBuf::from("outputs"),
            registry_file: PathBuf::from("outputs/sights.sqlite3"),
            cleanup_interval_secs: 5,
            number_of_matches: 1,
            max_payload_bytes: 32 * 1024 * 1024,
            pipeline: PipelineSettings::default(),
        }
    }
}

impl ServiceSettings {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// absent. `SIGHTLOC_BIND` overrides the bind address.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            log::info!("No settings at {}, using defaults", path.display());
            ServiceSettings::default()
        };

        if let Ok(bind) = std::env::var("SIGHTLOC_BIND") {
            settings.bind_address = bind;
        }

        Ok(settings)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// `SIGHTLOC_DEBUG=1` (or `true`) turns on debug logging.
pub fn debug_mode() -> bool {
    std::env::var("SIGHTLOC_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
