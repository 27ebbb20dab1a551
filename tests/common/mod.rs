use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Mutex,
};

use image::{DynamicImage, ImageFormat, RgbImage};
use sightloc_lib::pipeline::{LocalizationPipeline, Stage, StageConfig, StageError, StageResult};

pub const ANSWER: &str = "query_image.jpg 1 0 0 0 0.1 0.2 0.3";

const BOUNDARY: &str = "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00";

/// Succeeds at every stage and leaves behind the files the real pipeline
/// would produce.
#[derive(Default)]
pub struct StubPipeline {
    calls: Mutex<Vec<Stage>>,
}

impl StubPipeline {
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, stage: Stage) {
        self.calls.lock().unwrap().push(stage);
    }
}

fn write(path: &Path, contents: &[u8]) -> StageResult {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

impl LocalizationPipeline for StubPipeline {
    fn extract_features(&self, config: &StageConfig, image_dir: &Path, output_dir: &Path) -> StageResult {
        self.record(Stage::ExtractFeatures);
        if !image_dir.is_dir() {
            return Err(StageError::MissingFile(image_dir.to_path_buf()));
        }
        write(&output_dir.join(format!("{}.h5", config.output)), b"features")
    }

    fn match_features(
        &self,
        config: &StageConfig,
        pairs_file: &Path,
        feature_name: &str,
        output_dir: &Path,
        exhaustive: bool,
    ) -> StageResult {
        self.record(Stage::MatchFeatures);
        if exhaustive {
            write(pairs_file, b"")?;
        } else if !pairs_file.is_file() {
            return Err(StageError::MissingFile(pairs_file.to_path_buf()));
        }
        write(
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
        self.record(Stage::Reconstruct);
        let model = output_dir.join("models").join("0");
        fs::create_dir_all(&model)?;
        Ok(model)
    }

    fn triangulate(
        &self,
        model_output_dir: &Path,
        _reference_model: &Path,
        _image_dir: &Path,
        _pairs_file: &Path,
        _feature_file: &Path,
        _match_file: &Path,
    ) -> StageResult<PathBuf> {
        self.record(Stage::Triangulate);
        let model = model_output_dir.join("model");
        fs::create_dir_all(&model)?;
        Ok(model)
    }

    fn localize(
        &self,
        model: &Path,
        intrinsics_file: &Path,
        pairs_file: &Path,
        _feature_file: &Path,
        _match_file: &Path,
        result_file: &Path,
    ) -> StageResult {
        self.record(Stage::Localize);
        for input in [model, intrinsics_file, pairs_file] {
            if !input.exists() {
                return Err(StageError::MissingFile(input.to_path_buf()));
            }
        }
        write(result_file, ANSWER.as_bytes())
    }

    fn visualize(
        &self,
        result_file: &Path,
        _image_dir: &Path,
        _model: &Path,
        _top_k: usize,
        output_dir: &Path,
    ) -> StageResult {
        self.record(Stage::Visualize);
        if !result_file.exists() {
            return Err(StageError::MissingFile(result_file.to_path_buf()));
        }
        fs::create_dir_all(output_dir)?;
        Ok(())
    }
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 128]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

/// Multipart body as the mobile client posts it.
pub fn client_payload(jpeg: &[u8], latitude: f64, longitude: f64, rotation: i32) -> Vec<u8> {
    let message = format!(
        "focalLength: (1445, 1445) principalPoint: (960, 540) resolution: (1920, 1080),longitude{longitude},latitude{latitude},rotationZ{rotation},"
    );

    let mut payload = Vec::new();
    payload.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    payload.extend_from_slice(b"Content-Disposition: form-data; name=\"message\"\r\n\r\n");
    payload.extend_from_slice(message.as_bytes());
    payload.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    payload.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"upload.jpg\"\r\n\r\n",
    );
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    payload
}
