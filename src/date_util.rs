use chrono::{DateTime, NaiveDateTime};

/// Canonical storage format for every datetime column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalize a remote datetime string to `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts extended ISO-8601 (`T` separator, optional offset or `Z`,
/// optional fractional seconds) or an already-canonical string. Returns
/// `None` for absent or malformed input — callers store SQL NULL and the
/// batch continues. The wall-clock time is kept as written; no timezone
/// conversion is applied, so the `Z` form and its `+00:00` equivalent
/// normalize identically.
pub fn normalize_datetime(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains('T') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_local().format(DATETIME_FORMAT).to_string());
        }
        // ISO without an offset
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt.format(DATETIME_FORMAT).to_string());
        }
    } else if NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).is_ok() {
        return Some(s.to_string());
    }

    log::warn!("invalid datetime {s:?}, storing NULL");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_with_z_suffix() {
        assert_eq!(
            normalize_datetime(Some("2025-03-01T08:30:00Z")),
            Some("2025-03-01 08:30:00".to_string())
        );
    }

    #[test]
    fn test_z_equals_utc_offset() {
        assert_eq!(
            normalize_datetime(Some("2025-03-01T08:30:00Z")),
            normalize_datetime(Some("2025-03-01T08:30:00+00:00"))
        );
    }

    #[test]
    fn test_offset_keeps_wall_clock() {
        assert_eq!(
            normalize_datetime(Some("2025-03-01T08:30:00+02:00")),
            Some("2025-03-01 08:30:00".to_string())
        );
    }

    #[test]
    fn test_fractional_seconds_without_offset() {
        assert_eq!(
            normalize_datetime(Some("2025-03-01T08:30:00.123456")),
            Some("2025-03-01 08:30:00".to_string())
        );
    }

    #[test]
    fn test_canonical_is_idempotent() {
        assert_eq!(
            normalize_datetime(Some("2025-03-01 08:30:00")),
            Some("2025-03-01 08:30:00".to_string())
        );
    }

    #[test]
    fn test_absent_and_empty() {
        assert_eq!(normalize_datetime(None), None);
        assert_eq!(normalize_datetime(Some("")), None);
        assert_eq!(normalize_datetime(Some("   ")), None);
    }

    #[test]
    fn test_malformed_is_none_not_error() {
        assert_eq!(normalize_datetime(Some("not-a-date")), None);
        assert_eq!(normalize_datetime(Some("2025-03-01")), None);
        assert_eq!(normalize_datetime(Some("2025-13-90T99:00:00Z")), None);
    }
}
