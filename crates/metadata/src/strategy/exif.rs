use crate::error::{ErrorKind, Result};
use crate::models::{DateSource, Found, Location};
use crate::strategy::Strategy;
use crate::timestamp::parse_timestamp;
use ::exif::{Field, In, Reader, Tag, Value};
use exn::ResultExt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads the EXIF block embedded in common image formats (JPEG, TIFF, HEIF,
/// PNG, WebP) without any external tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exif;

impl Strategy for Exif {
    fn source(&self) -> DateSource {
        DateSource::Exif
    }

    fn read(&self, path: &Path) -> Result<Found> {
        let file = File::open(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        let exif = Reader::new().read_from_container(&mut BufReader::new(file)).or_raise(|| ErrorKind::Exif)?;
        Ok(Found { captured_at: capture_date(&exif), location: location(&exif) })
    }
}

fn capture_date(exif: &::exif::Exif) -> Option<time::PrimitiveDateTime> {
    [Tag::DateTimeOriginal, Tag::DateTime]
        .into_iter()
        .filter_map(|tag| exif.get_field(tag, In::PRIMARY).and_then(ascii))
        .find_map(parse_timestamp)
}

fn location(exif: &::exif::Exif) -> Option<Location> {
    let latitude = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S")?;
    let longitude = coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W")?;
    Location::new(latitude, longitude)
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn coordinate(exif: &::exif::Exif, value: Tag, reference: Tag, negative: &str) -> Option<f64> {
    let Value::Rational(parts) = &exif.get_field(value, In::PRIMARY)?.value else {
        return None;
    };
    let degrees = parts
        .iter()
        .take(3)
        .zip([1.0, 60.0, 3600.0])
        .map(|(part, divisor)| part.to_f64() / divisor)
        .sum::<f64>();
    if !degrees.is_finite() {
        return None;
    }
    let hemisphere = exif.get_field(reference, In::PRIMARY).and_then(ascii);
    Some(match hemisphere {
        Some(h) if h.trim().eq_ignore_ascii_case(negative) => -degrees,
        _ => degrees,
    })
}

fn ascii(field: &Field) -> Option<&str> {
    match &field.value {
        Value::Ascii(parts) => parts.first().and_then(|part| std::str::from_utf8(part).ok()),
        _ => None,
    }
}
