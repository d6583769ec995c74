use chrono::NaiveDateTime;

/// Structural metadata read from a decodable image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhotoMetadata {
    pub width: u32,
    pub height: u32,
    /// EXIF orientation tag value (1..=8). 1 when absent.
    pub orientation: u16,
    /// Short format name, e.g. `jpeg` or `png`.
    pub format: String,
    pub capture: Option<CaptureMetadata>,
}

/// Embedded capture metadata. Every field is optional because cameras and
/// editing tools populate wildly different subsets.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureMetadata {
    /// Local capture time as recorded by the camera (no timezone in EXIF).
    pub captured_at: Option<NaiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length_mm: Option<f64>,
    pub aperture: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<u32>,
    pub gps: Option<GpsCoordinates>,
}

impl CaptureMetadata {
    pub fn is_empty(&self) -> bool {
        *self == CaptureMetadata::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}
