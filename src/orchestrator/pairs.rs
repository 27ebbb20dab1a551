use std::{fs, path::Path};

use crate::error::{LocError, LocResult};

/// Writes one `<query> <reference>` line per ranked reference image.
pub fn write_localization_pairs(
    path: &Path,
    query_image: &str,
    ranked: &[(String, f64)],
) -> LocResult<()> {
    let contents = ranked
        .iter()
        .map(|(reference, _)| format!("{query_image} {reference}"))
        .collect::<Vec<_>>()
        .join("\n");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| LocError::artifact(parent, err))?;
    }
    fs::write(path, contents).map_err(|err| LocError::artifact(path, err))
}
