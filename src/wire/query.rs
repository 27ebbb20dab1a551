use std::{fs, path::Path};

use image::{DynamicImage, ImageFormat};

use crate::error::{LocError, LocResult};
use crate::layout::{SightLayout, QUERY_IMAGE_NAME};

use super::{DecodedRequest, Rotation};

/// What was written for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedQuery {
    pub image_name: String,
    pub width: u32,
    pub height: u32,
}

/// Writes the upright query image to the query workspace and into the
/// sight's image set, plus the COLMAP intrinsics line for it.
///
/// Blocking; run it off the async runtime.
pub fn stage_query(request: &DecodedRequest, layout: &SightLayout) -> LocResult<StagedQuery> {
    let decoded = image::load_from_memory_with_format(&request.image, ImageFormat::Jpeg)
        .map_err(|err| LocError::MalformedPayload(format!("embedded image is not a JPEG: {err}")))?;
    let upright = rotate_counter_clockwise(decoded, request.rotation);

    for target in [&layout.query_image, &layout.dataset_query_image] {
        ensure_parent(target)?;
        upright
            .save_with_format(target, ImageFormat::Jpeg)
            .map_err(|err| match err {
                image::ImageError::IoError(io) => LocError::artifact(target, io),
                other => LocError::MalformedPayload(format!("cannot re-encode query image: {other}")),
            })?;
    }

    ensure_parent(&layout.intrinsics_file)?;
    fs::write(
        &layout.intrinsics_file,
        request.intrinsics.colmap_line(QUERY_IMAGE_NAME),
    )
    .map_err(|err| LocError::artifact(&layout.intrinsics_file, err))?;

    Ok(StagedQuery {
        image_name: QUERY_IMAGE_NAME.to_string(),
        width: upright.width(),
        height: upright.height(),
    })
}

fn rotate_counter_clockwise(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => image.rotate270(),
        Rotation::Deg180 => image.rotate180(),
        Rotation::Deg270 => image.rotate90(),
    }
}

fn ensure_parent(path: &Path) -> LocResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| LocError::artifact(parent, err))?;
    }
    Ok(())
}
