//! Frame number ↔ timestamp conversion.
//!
//! Extra comparison frames are often noted as timecodes while watching a
//! clip. These helpers convert between `HH:MM:SS.fff` strings, [`Duration`]s
//! and frame numbers at a rational [`FrameRate`].
//!
//! # Example
//!
//! ```
//! use framecomp::timecode::{FrameRate, duration_to_frame, parse_timestamp};
//!
//! let rate: FrameRate = "24000/1001".parse()?;
//! let timestamp = parse_timestamp("00:01:00.000")?;
//! assert_eq!(duration_to_frame(timestamp, rate), 1439);
//! # Ok::<(), framecomp::timecode::TimecodeError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;

/// A timecode or frame rate string could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimecodeError {
    /// The timestamp is not `HH:MM:SS[.fraction]` (or `MM:SS`).
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
    /// The frame rate is not `num/den` or a positive number.
    #[error("Invalid frame rate: {0:?}")]
    InvalidFrameRate(String),
    /// Only 0, 3, 6 and 9 fractional digits are supported.
    #[error("Precision must be one of 0, 3, 6 or 9 (got {0})")]
    InvalidPrecision(u8),
}

/// A frame rate expressed as `numerator / denominator` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    /// Frames.
    pub numerator: u32,
    /// Per this many seconds.
    pub denominator: u32,
}

impl FrameRate {
    /// Create a rate; a zero denominator is treated as 1.
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator: if denominator == 0 { 1 } else { denominator },
        }
    }

    /// The rate as floating-point frames per second.
    pub fn as_f64(self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for FrameRate {
    type Err = TimecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TimecodeError::InvalidFrameRate(value.to_string());
        let trimmed = value.trim();

        if let Some((numerator, denominator)) = trimmed.split_once('/') {
            let numerator: u32 = numerator.trim().parse().map_err(|_| invalid())?;
            let denominator: u32 = denominator.trim().parse().map_err(|_| invalid())?;
            if numerator == 0 || denominator == 0 {
                return Err(invalid());
            }
            return Ok(FrameRate::new(numerator, denominator));
        }

        // Decimal rates such as 29.97 are kept to three places.
        let rate: f64 = trimmed.parse().map_err(|_| invalid())?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid());
        }
        if rate.fract() == 0.0 {
            return Ok(FrameRate::new(rate as u32, 1));
        }
        Ok(FrameRate::new((rate * 1000.0).round() as u32, 1000))
    }
}

/// Presentation time of `frame` at `rate`, rounded to the nanosecond.
pub fn frame_to_duration(frame: u64, rate: FrameRate) -> Duration {
    let nanos = u128::from(frame) * 1_000_000_000 * u128::from(rate.denominator)
        / u128::from(rate.numerator.max(1));
    Duration::from_nanos(nanos as u64)
}

/// Frame shown at `timestamp`, rounded to the nearest frame.
pub fn duration_to_frame(timestamp: Duration, rate: FrameRate) -> u64 {
    (timestamp.as_secs_f64() * rate.as_f64()).round() as u64
}

/// Parse `HH:MM:SS[.fraction]`, `MM:SS[.fraction]` or plain seconds.
///
/// # Errors
///
/// Returns [`TimecodeError::InvalidTimestamp`] for anything else.
pub fn parse_timestamp(value: &str) -> Result<Duration, TimecodeError> {
    let invalid = || TimecodeError::InvalidTimestamp(value.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [seconds] => (0, 0, *seconds),
        [minutes, seconds] => (0, minutes.parse::<u64>().map_err(|_| invalid())?, *seconds),
        [hours, minutes, seconds] => (
            hours.parse::<u64>().map_err(|_| invalid())?,
            minutes.parse::<u64>().map_err(|_| invalid())?,
            *seconds,
        ),
        _ => return Err(invalid()),
    };

    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 || (parts.len() > 1 && seconds >= 60.0) {
        return Err(invalid());
    }

    let whole = hours * 3600 + minutes * 60;
    Ok(Duration::from_secs(whole) + Duration::from_secs_f64(seconds))
}

/// Format `timestamp` as `HH:MM:SS` with `precision` fractional digits.
///
/// # Errors
///
/// Returns [`TimecodeError::InvalidPrecision`] unless `precision` is 0, 3, 6
/// or 9.
pub fn format_timestamp(timestamp: Duration, precision: u8) -> Result<String, TimecodeError> {
    if !matches!(precision, 0 | 3 | 6 | 9) {
        return Err(TimecodeError::InvalidPrecision(precision));
    }

    let total_seconds = timestamp.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if precision == 0 {
        // Whole seconds round half up, like the fractional forms do.
        let rounded = Duration::from_secs(total_seconds)
            + if timestamp.subsec_nanos() >= 500_000_000 {
                Duration::from_secs(1)
            } else {
                Duration::ZERO
            };
        if rounded.as_secs() != total_seconds {
            return format_timestamp(rounded, 0);
        }
        return Ok(format!("{hours:02}:{minutes:02}:{seconds:02}"));
    }

    let divisor = 10_u32.pow(9 - u32::from(precision));
    let fraction = (timestamp.subsec_nanos() + divisor / 2) / divisor;
    if fraction >= 10_u32.pow(u32::from(precision)) {
        return format_timestamp(Duration::from_secs(total_seconds + 1), precision);
    }

    Ok(format!(
        "{hours:02}:{minutes:02}:{seconds:02}.{fraction:0width$}",
        width = usize::from(precision)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_parses_fractions_and_decimals() {
        assert_eq!("24000/1001".parse::<FrameRate>().unwrap(), FrameRate::new(24000, 1001));
        assert_eq!("25".parse::<FrameRate>().unwrap(), FrameRate::new(25, 1));
        assert_eq!("29.97".parse::<FrameRate>().unwrap(), FrameRate::new(29970, 1000));
        assert!("30/0".parse::<FrameRate>().is_err());
        assert!("fast".parse::<FrameRate>().is_err());
    }

    #[test]
    fn frames_and_durations_round_trip_at_ntsc_rate() {
        let rate = FrameRate::new(24000, 1001);
        for frame in [0, 1, 23, 24, 1438, 34_000] {
            assert_eq!(duration_to_frame(frame_to_duration(frame, rate), rate), frame);
        }
    }

    #[test]
    fn parse_timestamp_accepts_common_forms() {
        assert_eq!(parse_timestamp("75").unwrap(), Duration::from_secs(75));
        assert_eq!(parse_timestamp("01:15").unwrap(), Duration::from_secs(75));
        assert_eq!(
            parse_timestamp("00:01:15.5").unwrap(),
            Duration::from_millis(75_500)
        );
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("00:61").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
    }

    #[test]
    fn format_timestamp_precisions() {
        let timestamp = Duration::from_millis(3_723_456);
        assert_eq!(format_timestamp(timestamp, 0).unwrap(), "01:02:03");
        assert_eq!(format_timestamp(timestamp, 3).unwrap(), "01:02:03.456");
        assert_eq!(format_timestamp(timestamp, 6).unwrap(), "01:02:03.456000");
        assert_eq!(format_timestamp(timestamp, 9).unwrap(), "01:02:03.456000000");
        assert_eq!(
            format_timestamp(Duration::from_millis(59_999_600), 0).unwrap(),
            "16:40:00"
        );
        assert!(matches!(
            format_timestamp(timestamp, 2),
            Err(TimecodeError::InvalidPrecision(2))
        ));
    }
}
