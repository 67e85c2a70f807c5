use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current wall-clock time as an RFC3339 string (UTC), the timestamp format
/// used throughout the store (`indexed_at`, `started_at`, deletion-manifest
/// `deleted_at`, ...).
pub fn now_iso8601() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Parse an RFC3339 timestamp, for comparisons like `started_at <= completed_at`.
pub fn parse_iso8601(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}
