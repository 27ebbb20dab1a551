//! Named extents of the sensor fields inside a request payload.
//!
//! Fields are located by searching for a marker string, then read from a
//! fixed-width window that starts right after the marker. The widths are
//! the ones deployed clients have always been served with; a longer value
//! is truncated at the window edge.
//! TODO: validate widths and offsets against captured client payloads
//! before treating this layout as frozen.

/// A field found by marker search and read from a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldExtent {
    pub marker: &'static str,
    pub window: usize,
}

pub const ROTATION: FieldExtent = FieldExtent {
    marker: "rotationZ",
    window: 4,
};

pub const RESOLUTION: FieldExtent = FieldExtent {
    marker: "resolution",
    window: 16,
};

pub const FOCAL_LENGTH: FieldExtent = FieldExtent {
    marker: "focalLength",
    window: 16,
};

pub const PRINCIPAL_POINT: FieldExtent = FieldExtent {
    marker: "principalPoint",
    window: 16,
};

pub const LATITUDE: FieldExtent = FieldExtent {
    marker: "latitude",
    window: 12,
};

pub const LONGITUDE: FieldExtent = FieldExtent {
    marker: "longitude",
    window: 12,
};

/// The embedded JPEG: found via the upload file name, it begins a fixed
/// distance after the marker and runs up to the multipart trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageExtent {
    pub marker: &'static str,
    /// Offset of the first image byte from the start of the marker.
    pub offset: usize,
    /// Bytes after the image (closing boundary line).
    pub trailer: usize,
}

pub const IMAGE: ImageExtent = ImageExtent {
    marker: "jpg",
    offset: 8,
    trailer: 48,
};

/// Locates `extent` in `payload` and returns its window, clamped to the
/// payload end. `None` when the marker does not occur at all.
pub fn window<'a>(payload: &'a [u8], extent: &FieldExtent) -> Option<&'a [u8]> {
    let start = find(payload, extent.marker.as_bytes())? + extent.marker.len();
    let end = start.saturating_add(extent.window).min(payload.len());
    Some(&payload[start..end])
}

/// First occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|candidate| candidate == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_starts_after_marker() {
        let payload = b"xx,rotationZ90,tail";
        assert_eq!(window(payload, &ROTATION), Some(&b"90,t"[..]));
    }

    #[test]
    fn window_is_clamped_to_payload_end() {
        let payload = b"latitude48.8";
        assert_eq!(window(payload, &LATITUDE), Some(&b"48.8"[..]));
    }

    #[test]
    fn absent_marker_has_no_window() {
        assert_eq!(window(b"longitude2.35", &LATITUDE), None);
    }

    #[test]
    fn find_first_occurrence() {
        assert_eq!(find(b"a jpg b jpg", b"jpg"), Some(2));
        assert_eq!(find(b"jp", b"jpg"), None);
    }
}
