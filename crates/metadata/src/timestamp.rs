use crate::consts::TIMESTAMP_REGEX;
use time::{Date, Month, PrimitiveDateTime, Time};

/// Parse a timestamp as found in media metadata.
///
/// Accepts EXIF-style `YYYY:MM:DD HH:MM:SS`, ISO-8601 `YYYY-MM-DDTHH:MM:SS`
/// (with a `T` or a space), with or without fractional seconds and with or
/// without a `Z`/`±HH:MM` suffix, as well as bare dates (which map to
/// midnight). Offsets are discarded: the wall-clock time as written is kept.
///
/// Anything else, including the `0000:00:00 00:00:00` placeholder some
/// cameras write when their clock was never set, returns `None`.
///
/// ```
/// use librarian_metadata::parse_timestamp;
/// assert!(parse_timestamp("2025:06:15 10:30:00").is_some());
/// assert!(parse_timestamp("2025-06-15T10:30:00.250+02:00").is_some());
/// assert!(parse_timestamp("0000:00:00 00:00:00").is_none());
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(value: &str) -> Option<PrimitiveDateTime> {
    // EXIF ASCII values are NUL-terminated.
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let captures = TIMESTAMP_REGEX.captures(value)?;
    // The regex only captures fixed-width digit runs.
    let number = |index: usize| captures.get(index).and_then(|m| m.as_str().parse::<u16>().ok()).unwrap_or(0);

    let month = Month::try_from(u8::try_from(number(2)).ok()?).ok()?;
    let date = Date::from_calendar_date(i32::from(number(1)), month, u8::try_from(number(3)).ok()?).ok()?;
    let time = Time::from_hms(
        u8::try_from(number(4)).ok()?,
        u8::try_from(number(5)).ok()?,
        u8::try_from(number(6)).ok()?,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Archive directory names for a capture time: `("YYYY", "YYYY-MM-DD")`.
pub fn path_components(captured_at: PrimitiveDateTime) -> (String, String) {
    let date = captured_at.date();
    let year = format!("{:04}", date.year());
    let day_folder = format!("{year}-{:02}-{:02}", u8::from(date.month()), date.day());
    (year, day_folder)
}
