use derive_more::Display;
use time::PrimitiveDateTime;

/// A GPS coordinate pair, in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}
impl Location {
    /// Build a location, rejecting values outside of the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }
}

/// Which tier of the fallback chain produced the capture timestamp.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    #[display("exiftool")]
    ExifTool,
    #[display("embedded EXIF")]
    Exif,
    #[display("file modification time")]
    FileModified,
}
impl DateSource {
    /// The timestamp doesn't reflect when the media was actually captured.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FileModified)
    }
}

/// Whatever a single strategy managed to read from a file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Found {
    pub captured_at: Option<PrimitiveDateTime>,
    pub location: Option<Location>,
}

/// Best-effort metadata for a media file.
///
/// Capture times are wall-clock times as recorded by the device; any UTC
/// offset present in the source metadata is discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metadata {
    pub captured_at: Option<PrimitiveDateTime>,
    pub location: Option<Location>,
    /// `None` when no strategy produced a capture time.
    pub source: Option<DateSource>,
}
