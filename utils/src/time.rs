//! Time formatting helpers for log lines.

use charter_types::Timestamp;

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        3600..=86_399 => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
        _ => format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600),
    }
}

/// How long until `end`, or "elapsed" if it has passed.
pub fn format_remaining(now: Timestamp, end: Timestamp) -> String {
    if now >= end {
        "elapsed".to_string()
    } else {
        format_duration(end.as_secs() - now.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_scale() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7_260), "2h 1m");
        assert_eq!(format_duration(7 * 86_400 + 3_600), "7d 1h");
    }

    #[test]
    fn remaining_reports_elapsed() {
        assert_eq!(
            format_remaining(Timestamp::new(10), Timestamp::new(5)),
            "elapsed"
        );
        assert_eq!(format_remaining(Timestamp::new(0), Timestamp::new(90)), "1m 30s");
    }
}
