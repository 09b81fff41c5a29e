//! Time related utils.

use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::error::{Error, ErrorKind, Result};

/// Export Format from time crate.
pub type Format = &'static [FormatItem<'static>];

/// Export OffsetDateTime from time crate.
pub type DateTime = time::OffsetDateTime;

/// Date format: "20110909"
pub const DATE: Format = format_description!("[year][month][day]");

/// Time format for ISO 8601 basic: "20110909T233600Z"
pub const ISO8601_BASIC: Format = format_description!("[year][month][day]T[hour][minute][second]Z");

/// Time format for RFC 1123: "Fri, 09 Sep 2011 23:36:00 GMT"
pub const RFC1123: Format =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

/// RFC 1123 without the leading weekday. Some producers emit a weekday
/// that disagrees with the calendar date; it carries no information, so
/// parsing skips it.
const RFC1123_DATE: Format =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

/// Current time in UTC.
pub fn now() -> DateTime {
    DateTime::now_utc()
}

/// Format time into date: "20110909"
pub fn format_date(t: DateTime) -> String {
    t.format(&DATE).expect("input time must be valid")
}

/// Format time into ISO 8601 basic: "20110909T233600Z"
pub fn format_iso8601(t: DateTime) -> String {
    t.format(&ISO8601_BASIC).expect("input time must be valid")
}

/// Format time into RFC 1123: "Fri, 09 Sep 2011 23:36:00 GMT"
pub fn format_rfc1123(t: DateTime) -> String {
    t.format(&RFC1123).expect("input time must be valid")
}

/// Parse a RFC 1123 time like "Fri, 09 Sep 2011 23:36:00 GMT".
pub fn parse_rfc1123(s: &str) -> Result<DateTime> {
    let s = s.split_once(", ").map_or(s, |(_, rest)| rest);
    let t = PrimitiveDateTime::parse(s, &RFC1123_DATE).map_err(|e| {
        Error::new(ErrorKind::Encoding, "time is not in RFC 1123 form")
            .with_operation("time::parse_rfc1123")
            .set_source(e)
    })?;
    Ok(t.assume_utc())
}

/// Parse a RFC 3339 time like "2012-03-20T17:03:43.221Z".
pub fn parse_rfc3339(s: &str) -> Result<DateTime> {
    DateTime::parse(s, &Rfc3339).map_err(|e| {
        Error::new(ErrorKind::Encoding, "time is not in RFC 3339 form")
            .with_operation("time::parse_rfc3339")
            .set_source(e)
    })
}
