//! Time and duration conversion utilities.
//!
//! Playback positions are exchanged as whole milliseconds, so conversions
//! saturate instead of truncating.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    fn as_millis_u64(&self) -> u64;

    /// Convert duration to milliseconds as i64, saturating at `i64::MAX`.
    ///
    /// Used for database storage.
    fn as_millis_i64(&self) -> i64;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }

    fn as_millis_i64(&self) -> i64 {
        i64::try_from(self.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Format milliseconds as `MM:SS`. Minutes are not wrapped into hours.
#[must_use]
pub fn format_mm_ss(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Ratio of `part` to `whole` clamped to `0.0..=1.0`; `0.0` when `whole` is zero.
#[must_use]
pub fn fraction(part: Duration, whole: Duration) -> f64 {
    if whole.is_zero() {
        return 0.0;
    }
    (part.as_secs_f64() / whole.as_secs_f64()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_millis_u64() {
        let duration = Duration::from_millis(1234);
        assert_eq!(duration.as_millis_u64(), 1234);
    }

    #[test]
    fn test_as_millis_i64() {
        let duration = Duration::from_millis(5000);
        assert_eq!(duration.as_millis_i64(), 5000);
    }

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(999), "00:00");
        assert_eq!(format_mm_ss(61_500), "01:01");
        assert_eq!(format_mm_ss(3_600_000), "60:00");
    }

    #[test]
    fn test_fraction() {
        assert!((fraction(Duration::from_secs(30), Duration::from_secs(120)) - 0.25).abs() < 1e-9);
        assert!((fraction(Duration::from_secs(500), Duration::from_secs(120)) - 1.0).abs() < 1e-9);
        assert!(fraction(Duration::from_secs(5), Duration::ZERO).abs() < 1e-9);
    }
}
