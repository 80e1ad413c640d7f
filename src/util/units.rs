//! Units formatting utilities
//!
//! Human-readable formatting of byte counts and durations for the
//! console report.

use byte_unit::{Byte, UnitType};
use std::time::Duration;

/// Format bytes into human-readable size with binary units
///
/// # Examples
/// ```
/// use demobench::util::units::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{:.1}", adjusted)
}

/// Format a trial duration as fractional seconds
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use demobench::util::units::format_seconds;
///
/// assert_eq!(format_seconds(Duration::from_millis(1500)), "1.500000s");
/// ```
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.6}s", duration.as_secs_f64())
}

/// Format a longer duration, truncated to milliseconds
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use demobench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(90_250)), "1m 30s 250ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let truncated = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(truncated).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(1048576), "1.0 MiB");
        assert_eq!(format_bytes(3 * 1073741824), "3.0 GiB");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(Duration::ZERO), "0.000000s");
        assert_eq!(format_seconds(Duration::from_micros(2_500_001)), "2.500001s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_nanos(1_200_999_999)), "1s 200ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
