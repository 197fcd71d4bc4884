//! Time-position parsing and formatting
//!
//! Seek positions arrive as `30`, `+5`, `-10`, `1:30`, or `1:02:30`.
//! Relative forms are resolved against the current position by the caller.

use crate::error::{Error, Result};

/// A parsed seek target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekPosition {
    /// Absolute position in seconds
    Absolute(f64),
    /// Offset in seconds from the current position (may be negative)
    Relative(f64),
}

impl SeekPosition {
    /// Resolve against the current position, clamped to [0, ∞).
    pub fn resolve(self, current: f64) -> f64 {
        let target = match self {
            SeekPosition::Absolute(secs) => secs,
            SeekPosition::Relative(delta) => current + delta,
        };
        target.max(0.0)
    }
}

/// Parse a seek position string: `30`, `+5`, `-10`, `1:30`, `1:02:30`.
pub fn parse_position(input: &str) -> Result<SeekPosition> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidArgs("empty seek position".to_string()));
    }

    if let Some(rest) = input.strip_prefix('+') {
        let delta = parse_clock(rest)?;
        return Ok(SeekPosition::Relative(delta));
    }
    if let Some(rest) = input.strip_prefix('-') {
        let delta = parse_clock(rest)?;
        return Ok(SeekPosition::Relative(-delta));
    }

    Ok(SeekPosition::Absolute(parse_clock(input)?))
}

/// Parse `SS`, `M:SS`, or `H:MM:SS` into seconds.
fn parse_clock(input: &str) -> Result<f64> {
    let bad = || Error::InvalidArgs(format!("Invalid time: {}", input));

    if !input.contains(':') {
        return input.parse::<f64>().map_err(|_| bad());
    }

    let parts: Vec<&str> = input.split(':').collect();
    match parts.as_slice() {
        [minutes, seconds] => {
            let m: u64 = minutes.parse().map_err(|_| bad())?;
            let s: f64 = seconds.parse().map_err(|_| bad())?;
            Ok(m as f64 * 60.0 + s)
        }
        [hours, minutes, seconds] => {
            let h: u64 = hours.parse().map_err(|_| bad())?;
            let m: u64 = minutes.parse().map_err(|_| bad())?;
            let s: f64 = seconds.parse().map_err(|_| bad())?;
            Ok(h as f64 * 3600.0 + m as f64 * 60.0 + s)
        }
        _ => Err(bad()),
    }
}

/// Format seconds as `M:SS` (or `H:MM:SS` from one hour up).
///
/// # Examples
///
/// ```
/// use atk_common::human_time::format_position;
///
/// assert_eq!(format_position(0.0), "0:00");
/// assert_eq!(format_position(330.4), "5:30");
/// assert_eq!(format_position(3750.0), "1:02:30");
/// ```
pub fn format_position(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_seconds() {
        assert_eq!(parse_position("30").unwrap(), SeekPosition::Absolute(30.0));
        assert_eq!(parse_position("12.5").unwrap(), SeekPosition::Absolute(12.5));
    }

    #[test]
    fn test_parse_relative() {
        assert_eq!(parse_position("+5").unwrap(), SeekPosition::Relative(5.0));
        assert_eq!(parse_position("-10").unwrap(), SeekPosition::Relative(-10.0));
    }

    #[test]
    fn test_parse_clock_forms() {
        assert_eq!(parse_position("1:30").unwrap(), SeekPosition::Absolute(90.0));
        assert_eq!(
            parse_position("1:02:30").unwrap(),
            SeekPosition::Absolute(3750.0)
        );
        assert_eq!(
            parse_position("+1:00").unwrap(),
            SeekPosition::Relative(60.0)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_position("").is_err());
        assert!(parse_position("abc").is_err());
        assert!(parse_position("1:2:3:4").is_err());
        assert!(parse_position("1:xx").is_err());
    }

    #[test]
    fn test_resolve_clamps_to_zero() {
        assert_eq!(SeekPosition::Relative(-30.0).resolve(10.0), 0.0);
        assert_eq!(SeekPosition::Relative(5.0).resolve(20.0), 25.0);
        assert_eq!(SeekPosition::Absolute(30.0).resolve(99.0), 30.0);
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "0:00");
        assert_eq!(format_position(59.9), "0:59");
        assert_eq!(format_position(90.0), "1:30");
        assert_eq!(format_position(3750.0), "1:02:30");
        assert_eq!(format_position(-5.0), "0:00");
    }
}
