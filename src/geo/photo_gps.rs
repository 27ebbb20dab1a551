use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use exif::{Exif, In, Reader, Tag, Value};

use super::GpsCoordinate;

/// Reads the GPS position embedded in an image's EXIF block.
///
/// Returns `Ok(None)` when the image has no EXIF data or no complete GPS
/// latitude/longitude pair; only I/O failures are errors.
pub fn read_gps(path: &Path) -> Result<Option<GpsCoordinate>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let exif = match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(exif::Error::Io(err)) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
        Err(err) => {
            log::debug!("no usable EXIF in {}: {err}", path.display());
            return Ok(None);
        }
    };

    let latitude = signed_degrees(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S');
    let longitude = signed_degrees(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W');

    Ok(match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GpsCoordinate::new(lat, lon)),
        _ => None,
    })
}

fn signed_degrees(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let degrees = match &field.value {
        Value::Rational(parts) if !parts.is_empty() => parts
            .iter()
            .take(3)
            .zip([1.0, 60.0, 3600.0])
            .map(|(part, divisor)| part.to_f64() / divisor)
            .sum::<f64>(),
        _ => return None,
    };

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .map(|field| match &field.value {
            Value::Ascii(values) => values
                .first()
                .and_then(|v| v.first())
                .map(|c| c.eq_ignore_ascii_case(&negative_ref))
                .unwrap_or(false),
            _ => false,
        })
        .unwrap_or(false);

    Some(if negative { -degrees } else { degrees })
}
