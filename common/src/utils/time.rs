use chrono::{DateTime, FixedOffset, Utc};

/// Current UTC time in ISO-8601 / RFC 3339 form, the single timestamp format
/// used across stores and wire payloads.
pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Best-effort ISO-8601 parser accepting both offset and trailing-Z forms.
pub fn parse_iso(ts: &str) -> Option<DateTime<FixedOffset>> {
    if ts.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(ts).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_and_zulu_forms() {
        assert!(parse_iso("2026-08-01T02:00:00+00:00").is_some());
        assert!(parse_iso("2026-08-01T02:00:00Z").is_some());
        assert!(parse_iso("").is_none());
        assert!(parse_iso("not-a-date").is_none());
    }

    #[test]
    fn now_is_parseable() {
        assert!(parse_iso(&now_utc_iso()).is_some());
    }
}
