use crate::error::{ErrorKind, Result};
use crate::models::{DateSource, Found, Location};
use crate::strategy::Strategy;
use crate::timestamp::parse_timestamp;
use exn::{OptionExt, ResultExt};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use time::PrimitiveDateTime;

/// Tags that may hold a capture date, most trustworthy first. A bare name
/// matches that tag in any group; `Group:Name` only in that group.
/// `FileModifyDate` is the last resort within this tier.
const DATE_TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "MediaCreateDate",
    "TrackCreateDate",
    "CreationDate",
    "XMP:DateCreated",
    "IPTC:DateCreated",
    "FileModifyDate",
];
/// IPTC stores the date and the time of day in separate tags.
const IPTC_DATE: &str = "IPTC:DateCreated";
const IPTC_TIME: &str = "IPTC:TimeCreated";
/// Signed decimal degrees; the EXIF tags carry the hemisphere separately.
const GPS_LATITUDE: &str = "Composite:GPSLatitude";
const GPS_LONGITUDE: &str = "Composite:GPSLongitude";

/// Reads metadata by shelling out to [exiftool](https://exiftool.org), which
/// understands images, videos and RAW formats alike.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
}
impl ExifTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Look for `exiftool` on the `PATH`.
    pub fn discover() -> Option<Self> {
        match which::which("exiftool") {
            Ok(binary) => {
                tracing::debug!(exiftool = %binary.display(), "Discovered exiftool");
                Some(Self::new(binary))
            },
            Err(_) => {
                tracing::info!("exiftool not found in PATH; only embedded EXIF data will be read");
                None
            },
        }
    }

    fn tags(&self, path: &Path) -> Result<Map<String, Value>> {
        let output = Command::new(&self.binary)
            // `-G -a` keeps same-named tags from different groups apart;
            // `-n` gives plain numbers for GPS coordinates.
            .args(["-json", "-G", "-a", "-n", "-q", "-m"])
            .args(DATE_TAGS.iter().chain([&IPTC_TIME, &GPS_LATITUDE, &GPS_LONGITUDE]).map(|tag| format!("-{tag}")))
            .arg(path)
            .output()
            .or_raise(|| ErrorKind::ExifTool(format!("unable to run {}", self.binary.display())))?;
        if !output.status.success() {
            exn::bail!(ErrorKind::ExifTool(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        let mut documents: Vec<Map<String, Value>> = serde_json::from_slice(&output.stdout)
            .or_raise(|| ErrorKind::ExifTool("unexpected JSON output".to_string()))?;
        documents.pop().ok_or_raise(|| ErrorKind::ExifTool("no output for file".to_string()))
    }
}

impl Strategy for ExifTool {
    fn source(&self) -> DateSource {
        DateSource::ExifTool
    }

    fn read(&self, path: &Path) -> Result<Found> {
        Ok(interpret(&self.tags(path)?))
    }
}

/// Pick the capture date and location out of exiftool's grouped (`-G`) JSON
/// for one file.
pub(crate) fn interpret(tags: &Map<String, Value>) -> Found {
    let captured_at = DATE_TAGS.iter().find_map(|tag| {
        tags.iter()
            .filter(|(key, _)| is_tag(key, tag))
            .filter_map(|(_, value)| value.as_str())
            .find_map(|value| date_value(tags, tag, value))
    });
    let location = match (coordinate(tags.get(GPS_LATITUDE)), coordinate(tags.get(GPS_LONGITUDE))) {
        (Some(latitude), Some(longitude)) => Location::new(latitude, longitude),
        _ => None,
    };
    Found { captured_at, location }
}

/// Whether the `Group:Name` key `key` is the tag `tag` names.
fn is_tag(key: &str, tag: &str) -> bool {
    if tag.contains(':') {
        return key == tag;
    }
    key.split_once(':').map_or(key, |(_, name)| name) == tag
}

fn date_value(tags: &Map<String, Value>, tag: &str, value: &str) -> Option<PrimitiveDateTime> {
    if tag == IPTC_DATE
        && let Some(time) = tags.get(IPTC_TIME).and_then(Value::as_str)
        && let Some(combined) = parse_timestamp(&format!("{} {}", value.trim(), time.trim()))
    {
        return Some(combined);
    }
    parse_timestamp(value)
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn tags(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn original_date_beats_file_date() {
        let found = interpret(&tags(json!({
            "SourceFile": "/inbox/IMG_0001.jpg",
            "File:FileModifyDate": "2025:07:01 09:00:00+02:00",
            "EXIF:DateTimeOriginal": "2025:06:15 10:30:00",
            "EXIF:CreateDate": "2025:06:16 10:30:00",
        })));
        assert_eq!(found.captured_at, Some(datetime!(2025-06-15 10:30:00)));
    }

    #[test]
    fn unparseable_tag_falls_through_to_next() {
        let found = interpret(&tags(json!({
            "EXIF:DateTimeOriginal": "0000:00:00 00:00:00",
            "QuickTime:MediaCreateDate": "2023-03-04T05:06:07Z",
        })));
        assert_eq!(found.captured_at, Some(datetime!(2023-03-04 05:06:07)));
    }

    #[test]
    fn same_tag_in_another_group_is_still_a_candidate() {
        let found = interpret(&tags(json!({
            "EXIF:DateTimeOriginal": "0000:00:00 00:00:00",
            "XMP:DateTimeOriginal": "2024:02:29 12:00:00",
        })));
        assert_eq!(found.captured_at, Some(datetime!(2024-02-29 12:00:00)));
    }

    #[test]
    fn quicktime_creation_date() {
        let found = interpret(&tags(json!({ "QuickTime:CreationDate": "2022:08:09 10:11:12.000-04:00" })));
        assert_eq!(found.captured_at, Some(datetime!(2022-08-09 10:11:12)));
    }

    #[test]
    fn iptc_date_is_combined_with_its_time() {
        let found = interpret(&tags(json!({
            "IPTC:DateCreated": "2021:01:02",
            "IPTC:TimeCreated": "10:11:12+02:00",
            "File:FileModifyDate": "2025:07:01 09:00:00+02:00",
        })));
        assert_eq!(found.captured_at, Some(datetime!(2021-01-02 10:11:12)));
        // A time that can't be read still leaves the date.
        let found = interpret(&tags(json!({ "IPTC:DateCreated": "2021:01:02", "IPTC:TimeCreated": "noon" })));
        assert_eq!(found.captured_at, Some(datetime!(2021-01-02 00:00:00)));
    }

    #[test]
    fn xmp_date_created_beats_iptc() {
        let found = interpret(&tags(json!({
            "IPTC:DateCreated": "2021:01:02",
            "IPTC:TimeCreated": "10:11:12",
            "XMP:DateCreated": "2020:05:06 07:08:09",
        })));
        assert_eq!(found.captured_at, Some(datetime!(2020-05-06 07:08:09)));
    }

    #[test]
    fn group_qualified_candidates_ignore_other_groups() {
        assert!(is_tag("IPTC:DateCreated", "IPTC:DateCreated"));
        assert!(!is_tag("Photoshop:DateCreated", "IPTC:DateCreated"));
        assert!(is_tag("QuickTime:CreateDate", "CreateDate"));
        assert!(!is_tag("EXIF:SubSecCreateDate", "CreateDate"));
        assert!(is_tag("CreateDate", "CreateDate"));
    }

    #[test]
    fn location_requires_both_coordinates() {
        let found = interpret(&tags(json!({ "Composite:GPSLatitude": -33.8688, "Composite:GPSLongitude": 151.2093 })));
        assert_eq!(found.location, Some(Location { latitude: -33.8688, longitude: 151.2093 }));
        assert_eq!(found.captured_at, None);
        let found = interpret(&tags(json!({ "Composite:GPSLatitude": "12.5" })));
        assert_eq!(found.location, None);
    }

    #[test]
    fn missing_binary_is_an_error() {
        let exiftool = ExifTool::new("/nonexistent/exiftool");
        assert!(exiftool.read(Path::new("/inbox/a.jpg")).is_err());
    }
}
