use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Date with either EXIF-style colons or ISO dashes, an optional time (`T` or a
// space as separator), optional fractional seconds and an optional offset.
// The offset is matched so that it can be discarded.
regex!(
    TIMESTAMP_REGEX,
    r"^(\d{4})[:\-](\d{2})[:\-](\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?(?:[.,]\d+)?)?\s*(?:Z|[+\-]\d{2}(?::?\d{2})?)?$"
);
