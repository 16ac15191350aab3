use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Line endings are normalized to `\n` before any splitting.
pub fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Canonical lookup key for a dictionary term: trimmed and lower-cased.
pub fn normalize_term(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Current time as an RFC3339 UTC string. Falls back to the unix epoch text if
/// formatting fails so callers never have to handle a timestamp error.
pub fn now_rfc3339_utc() -> String {
    OffsetDateTime::now_utc()
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
