use log::warn;

use crate::error::{LocError, LocResult};
use crate::geo::GpsCoordinate;

use super::fields::{self, FieldExtent};
use super::{CameraIntrinsics, DecodedRequest, Rotation};

/// Decodes an upload payload into its sensor fields and embedded image.
///
/// Fails with `MalformedPayload` when a marker is absent or a field's
/// window holds no parseable number. Values longer than their window are
/// read as far as the window allows.
pub fn decode(payload: &[u8]) -> LocResult<DecodedRequest> {
    let degrees = read_integer(payload, &fields::ROTATION)?;
    let rotation = Rotation::from_degrees(degrees).ok_or_else(|| {
        LocError::MalformedPayload(format!("rotation {degrees} is not a multiple of 90"))
    })?;

    let intrinsics = CameraIntrinsics {
        resolution: read_pair(payload, &fields::RESOLUTION)?,
        focal_length: read_pair(payload, &fields::FOCAL_LENGTH)?,
        principal_point: read_pair(payload, &fields::PRINCIPAL_POINT)?,
    }
    .oriented(rotation);

    let gps = GpsCoordinate::new(
        read_scalar(payload, &fields::LATITUDE)?,
        read_scalar(payload, &fields::LONGITUDE)?,
    );
    if !gps.is_finite() {
        warn!(
            "payload carries non-finite GPS ({}, {}); sight selection will be arbitrary",
            gps.latitude, gps.longitude
        );
    }

    let image = image_bytes(payload)?.to_vec();

    Ok(DecodedRequest {
        rotation,
        intrinsics,
        gps,
        image,
    })
}

fn image_bytes(payload: &[u8]) -> LocResult<&[u8]> {
    let extent = fields::IMAGE;
    let marker = fields::find(payload, extent.marker.as_bytes())
        .ok_or_else(|| missing(extent.marker))?;
    let start = marker + extent.offset;
    let end = payload.len().saturating_sub(extent.trailer);

    if start >= end {
        return Err(LocError::MalformedPayload(format!(
            "embedded image is empty (starts at {start}, payload is {} bytes)",
            payload.len()
        )));
    }

    Ok(&payload[start..end])
}

fn field_window<'a>(payload: &'a [u8], extent: &FieldExtent) -> LocResult<&'a [u8]> {
    fields::window(payload, extent).ok_or_else(|| missing(extent.marker))
}

fn read_integer(payload: &[u8], extent: &FieldExtent) -> LocResult<i32> {
    let window = field_window(payload, extent)?;
    let text = until_any(window, b",");
    parse_number(text, extent)
}

fn read_scalar(payload: &[u8], extent: &FieldExtent) -> LocResult<f64> {
    let window = field_window(payload, extent)?;
    let text = until_any(window, b",\r");
    parse_number(text, extent)
}

/// Reads `(a, b)`; a missing `)` means the value ran past the window.
fn read_pair(payload: &[u8], extent: &FieldExtent) -> LocResult<(f64, f64)> {
    let window = field_window(payload, extent)?;

    let open = window
        .iter()
        .position(|&b| b == b'(')
        .ok_or_else(|| malformed_field(extent, "missing '('"))?;
    let inner = &window[open + 1..];
    let separator = inner
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| malformed_field(extent, "missing ','"))?;
    let second = until_any(&inner[separator + 1..], b")");

    Ok((
        parse_number(&inner[..separator], extent)?,
        parse_number(second, extent)?,
    ))
}

fn until_any<'a>(window: &'a [u8], separators: &[u8]) -> &'a [u8] {
    let end = window
        .iter()
        .position(|b| separators.contains(b))
        .unwrap_or(window.len());
    &window[..end]
}

fn parse_number<T: std::str::FromStr>(raw: &[u8], extent: &FieldExtent) -> LocResult<T> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| malformed_field(extent, "not text"))?
        .trim();
    text.parse::<T>()
        .map_err(|_| malformed_field(extent, &format!("'{text}' is not a number")))
}

fn missing(marker: &str) -> LocError {
    LocError::MalformedPayload(format!("marker '{marker}' not found"))
}

fn malformed_field(extent: &FieldExtent, reason: &str) -> LocError {
    LocError::MalformedPayload(format!("field '{}': {reason}", extent.marker))
}
