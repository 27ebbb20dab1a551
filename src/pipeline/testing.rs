use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    thread,
    time::Duration,
};

use super::{LocalizationPipeline, Stage, StageConfig, StageError, StageResult};

pub const DEFAULT_ANSWER: &str = "query_image.jpg 1 0 0 0 0.1 0.2 0.3";

/// Pipeline double that writes placeholder artifacts where the real
/// stages would, and records which stages ran and how many overlapped.
pub struct StubPipeline {
    calls: Mutex<Vec<Stage>>,
    fail_at: Mutex<Option<Stage>>,
    answer: Mutex<String>,
    hold: Mutex<Option<(Stage, Duration)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// Marks one stage call as in flight until dropped.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for StubPipeline {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_at: Mutex::new(None),
            answer: Mutex::new(DEFAULT_ANSWER.to_string()),
            hold: Mutex::new(None),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }
}

impl StubPipeline {
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_at(&self, stage: Option<Stage>) {
        *self.fail_at.lock().unwrap() = stage;
    }

    pub fn set_answer(&self, answer: &str) {
        *self.answer.lock().unwrap() = answer.to_string();
    }

    /// Makes every call of `stage` block for `duration` before it writes.
    pub fn hold(&self, stage: Stage, duration: Duration) {
        *self.hold.lock().unwrap() = Some((stage, duration));
    }

    /// Most stage calls ever observed in flight at once.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn enter(&self, stage: Stage) -> StageResult<Running<'_>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let running = Running(&self.running);

        self.calls.lock().unwrap().push(stage);
        let hold = *self.hold.lock().unwrap();
        if let Some((held, duration)) = hold {
            if held == stage {
                thread::sleep(duration);
            }
        }
        if *self.fail_at.lock().unwrap() == Some(stage) {
            return Err(StageError::Failed(format!("{stage} failed on purpose")));
        }
        Ok(running)
    }
}

fn touch(path: &Path, contents: &[u8]) -> StageResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

impl LocalizationPipeline for StubPipeline {
    fn extract_features(&self, config: &StageConfig, _image_dir: &Path, output_dir: &Path) -> StageResult {
        let _running = self.enter(Stage::ExtractFeatures)?;
        touch(&output_dir.join(format!("{}.h5", config.output)), b"features")
    }

    fn match_features(
        &self,
        config: &StageConfig,
        pairs_file: &Path,
        feature_name: &str,
        output_dir: &Path,
        exhaustive: bool,
    ) -> StageResult {
        let _running = self.enter(Stage::MatchFeatures)?;
        if exhaustive {
            touch(pairs_file, b"a.jpg b.jpg")?;
        }
        touch(
            &output_dir.join(format!("{feature_name}_{}.h5", config.output)),
            b"matches",
        )
    }

    fn reconstruct(
        &self,
        output_dir: &Path,
        _image_dir: &Path,
        _pairs_file: &Path,
        _feature_file: &Path,
        _match_file: &Path,
    ) -> StageResult<PathBuf> {
        let _running = self.enter(Stage::Reconstruct)?;
        let model = output_dir.join("models").join("0");
        fs::create_dir_all(&model)?;
        Ok(model)
    }

    fn triangulate(
        &self,
        model_output_dir: &Path,
        reference_model: &Path,
        _image_dir: &Path,
        _pairs_file: &Path,
        _feature_file: &Path,
        _match_file: &Path,
    ) -> StageResult<PathBuf> {
        let _running = self.enter(Stage::Triangulate)?;
        if !reference_model.exists() {
            return Err(StageError::MissingFile(reference_model.to_path_buf()));
        }
        let model = model_output_dir.join("model");
        fs::create_dir_all(&model)?;
        Ok(model)
    }

    fn localize(
        &self,
        _model: &Path,
        intrinsics_file: &Path,
        _pairs_file: &Path,
        _feature_file: &Path,
        _match_file: &Path,
        result_file: &Path,
    ) -> StageResult {
        let _running = self.enter(Stage::Localize)?;
        if !intrinsics_file.exists() {
            return Err(StageError::MissingFile(intrinsics_file.to_path_buf()));
        }
        let answer = self.answer.lock().unwrap().clone();
        touch(result_file, answer.as_bytes())
    }

    fn visualize(
        &self,
        result_file: &Path,
        _image_dir: &Path,
        _model: &Path,
        _top_k: usize,
        output_dir: &Path,
    ) -> StageResult {
        let _running = self.enter(Stage::Visualize)?;
        if !result_file.exists() {
            return Err(StageError::MissingFile(result_file.to_path_buf()));
        }
        touch(&output_dir.join("matches.png"), b"png")
    }
}
