//! Human-readable sizes, relative times and repository-name helpers.

use chrono::{DateTime, Utc};

const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) units, rounded to two decimals
/// with trailing zeros dropped: `1536` → `"1.5 KB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scale: u64 = 1;
    while unit + 1 < UNITS.len() && bytes / scale >= 1024 {
        scale *= 1024;
        unit += 1;
    }

    let value = bytes as f64 / scale as f64;
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// "just now", "about 5 minutes ago", ... relative to `now`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();

    let (count, unit) = match seconds {
        s if s < 60 => return "just now".to_string(),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 2_592_000 => (s / 86_400, "day"),
        s if s < 31_536_000 => (s / 2_592_000, "month"),
        s => (s / 31_536_000, "year"),
    };

    let plural = if count == 1 { "" } else { "s" };
    format!("about {} {}{} ago", count, unit, plural)
}

/// Split a catalog name on its last `/` into `(namespace, name)`.
pub fn split_repository_name(full_name: &str) -> (Option<String>, String) {
    match full_name.rsplit_once('/') {
        Some((namespace, name)) => (Some(namespace.to_string()), name.to_string()),
        None => (None, full_name.to_string()),
    }
}

/// Parse an RFC 3339 timestamp as found in image configs.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3_370_706), "3.21 MB");
        assert_eq!(format_bytes(1_073_741_824), "1 GB");
        assert_eq!(format_bytes(5 * 1024u64.pow(4)), "5 TB");
        assert_eq!(format_bytes(2048 * 1024u64.pow(4)), "2048 TB");
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::seconds(10), now), "just now");
        assert_eq!(
            relative_time(now - Duration::minutes(1), now),
            "about 1 minute ago"
        );
        assert_eq!(
            relative_time(now - Duration::hours(5), now),
            "about 5 hours ago"
        );
        assert_eq!(relative_time(now - Duration::days(3), now), "about 3 days ago");
        assert_eq!(
            relative_time(now - Duration::days(65), now),
            "about 2 months ago"
        );
        assert_eq!(
            relative_time(now - Duration::days(800), now),
            "about 2 years ago"
        );
    }

    #[test]
    fn test_split_repository_name() {
        assert_eq!(split_repository_name("alpine"), (None, "alpine".to_string()));
        assert_eq!(
            split_repository_name("library/alpine"),
            (Some("library".to_string()), "alpine".to_string())
        );
        assert_eq!(
            split_repository_name("org/team/app"),
            (Some("org/team".to_string()), "app".to_string())
        );
    }

    #[test]
    fn test_parse_timestamp() {
        let parsed = parse_timestamp("2024-03-01T12:00:00.123456789Z").unwrap();
        assert_eq!(parsed.timestamp(), 1_709_294_400);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
