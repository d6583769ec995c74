use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{Exif, In, Tag, Value};
use photosync_model::{CaptureMetadata, GpsCoordinates};
use tracing::trace;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Best-effort EXIF read. Missing or malformed EXIF never fails extraction;
/// it yields orientation 1 and no capture block.
pub fn read_capture_metadata(path: &Path) -> (u16, Option<CaptureMetadata>) {
    let Ok(file) = File::open(path) else {
        return (1, None);
    };
    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(err) => {
            trace!(path = %path.display(), error = %err, "no usable EXIF");
            return (1, None);
        }
    };

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .and_then(|value| u16::try_from(value).ok())
        .filter(|value| (1..=8).contains(value))
        .unwrap_or(1);

    let capture = CaptureMetadata {
        captured_at: ascii_field(&exif, Tag::DateTimeOriginal)
            .or_else(|| ascii_field(&exif, Tag::DateTime))
            .and_then(|raw| {
                NaiveDateTime::parse_from_str(&raw, EXIF_DATETIME_FORMAT).ok()
            }),
        camera_make: ascii_field(&exif, Tag::Make),
        camera_model: ascii_field(&exif, Tag::Model),
        lens_model: ascii_field(&exif, Tag::LensModel),
        focal_length_mm: rational_field(&exif, Tag::FocalLength),
        aperture: rational_field(&exif, Tag::FNumber),
        exposure_time: exif
            .get_field(Tag::ExposureTime, In::PRIMARY)
            .map(|field| field.display_value().to_string()),
        iso: exif
            .get_field(Tag::PhotographicSensitivity, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0)),
        gps: gps_coordinates(&exif),
    };

    let capture = (!capture.is_empty()).then_some(capture);
    (orientation, capture)
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(values) => values
            .first()
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .to_string()
            })
            .filter(|value| !value.is_empty()),
        _ => None,
    }
}

fn rational_field(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => values
            .first()
            .map(|r| r.to_f64())
            .filter(|value| value.is_finite()),
        _ => None,
    }
}

fn gps_coordinates(exif: &Exif) -> Option<GpsCoordinates> {
    let latitude = dms_degrees(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S')?;
    let longitude =
        dms_degrees(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W')?;
    let in_range =
        (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
    in_range.then_some(GpsCoordinates {
        latitude,
        longitude,
    })
}

fn dms_degrees(
    exif: &Exif,
    value_tag: Tag,
    ref_tag: Tag,
    negative_ref: char,
) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(parts) = &field.value else {
        return None;
    };
    if parts.len() != 3 {
        return None;
    }
    let degrees =
        parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
    if !degrees.is_finite() {
        return None;
    }
    let negative = ascii_field(exif, ref_tag)
        .and_then(|r| r.chars().next())
        .is_some_and(|c| c.eq_ignore_ascii_case(&negative_ref));
    Some(if negative { -degrees } else { degrees })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn images_without_exif_default_orientation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::new(4, 4)
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        assert_eq!(read_capture_metadata(&path), (1, None));
    }

    #[test]
    fn missing_files_default_orientation() {
        let dir = tempdir().unwrap();
        assert_eq!(
            read_capture_metadata(&dir.path().join("nope.jpg")),
            (1, None)
        );
    }
}
