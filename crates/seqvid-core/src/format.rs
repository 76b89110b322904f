//! Short human-readable strings for progress reporting.

use std::time::Duration;

/// Anything past a week is treated as a bogus clock reading.
const MAX_SANE_SECONDS: f64 = 86400.0 * 7.0;

/// `"3m 07s"`-style elapsed time. Negative input reads as zero.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    if seconds > MAX_SANE_SECONDS {
        return "...".to_string();
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{}m {}s", minutes, secs)
}

pub fn format_duration(elapsed: Duration) -> String {
    format_time(elapsed.as_secs_f64())
}

/// `"512 B"`, `"1.5 KB"`, `"3.25 MB"`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

/// `"42%"` for a fraction in `[0, 1]`.
pub fn format_percent(fraction: f64) -> String {
    format!("{:.0}%", (fraction.clamp(0.0, 1.0) * 100.0).floor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0m 0s");
        assert_eq!(format_time(59.9), "0m 59s");
        assert_eq!(format_time(125.0), "2m 5s");
        assert_eq!(format_time(-4.0), "0m 0s");
        assert_eq!(format_time(86400.0 * 8.0), "...");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m 1s");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 256 * 1024), "5.25 MB");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.424), "42%");
        assert_eq!(format_percent(1.7), "100%");
    }
}
