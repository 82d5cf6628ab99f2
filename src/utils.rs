//! Formatting helpers for progress output and listings

use std::time::Duration;

const SI_UNITS: [&str; 6] = ["", "kB", "MB", "GB", "TB", "PB"];

/// Format a byte count with decimal (SI) units
///
/// The value is divided by 1000 while it exceeds 1000 and printed with one
/// decimal in a five-character field, e.g. `"  1.5 MB"`. Values beyond the
/// petabyte range stay in PB.
///
/// # Examples
///
/// ```
/// use slurp::utils::format_size;
///
/// assert_eq!(format_size(1_500_000), "  1.5 MB");
/// assert_eq!(format_size(999), "999.0 ");
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value > 1000.0 && unit < SI_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:5.1} {}", value, SI_UNITS[unit])
}

/// Format an elapsed time as `h:mm:ss`
///
/// # Examples
///
/// ```
/// use slurp::utils::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
/// ```
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Percentage of `done` out of `total`, clamped to 0..=100
///
/// An empty total counts as finished.
pub fn percent(done: u64, total: u64) -> f32 {
    if total == 0 {
        return 100.0;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0) as f32
}
