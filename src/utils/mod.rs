//! Project-specific utilities live here.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current UTC timestamp in RFC 3339 format, as stored in the database.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().to_string())
}

/// Current UTC calendar year, the upper bound for publication years.
pub fn current_year() -> i64 {
    i64::from(OffsetDateTime::now_utc().year())
}
