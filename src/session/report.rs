//! Statistics surfaced to observers on every poll tick.

use crate::analysis::QualitySample;
use std::fmt;
use std::time::Duration;

/// One tick's worth of displayable statistics.
///
/// Counters still at zero are `None`: before the first real sample arrives
/// there is nothing meaningful to show, and a zero would only flicker.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub elapsed: Duration,
    pub buffer_position: Option<u64>,
    pub total_generated: Option<u64>,
    pub chi_square: Option<f64>,
    pub rejected_frames: Option<u64>,
    pub corrupt_pixel_percent: Option<f64>,
    /// Chi-square exceeds the configured threshold.
    pub chi_warning: bool,
}

impl StatsReport {
    pub fn from_sample(sample: &QualitySample, elapsed: Duration, chi_warning: bool) -> Self {
        Self {
            elapsed,
            buffer_position: nonzero(sample.buffer_position),
            total_generated: nonzero(sample.total_generated),
            chi_square: (sample.chi_square > 0.0).then_some(sample.chi_square),
            rejected_frames: nonzero(sample.rejected_frames),
            corrupt_pixel_percent: (sample.corrupt_pixel_percent > 0.0)
                .then_some(sample.corrupt_pixel_percent),
            chi_warning,
        }
    }

    /// Elapsed time as `MM:SS`.
    pub fn elapsed_clock(&self) -> String {
        let secs = self.elapsed.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

fn nonzero(v: u64) -> Option<u64> {
    (v != 0).then_some(v)
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "elapsed {}", self.elapsed_clock())?;
        if let Some(v) = self.buffer_position {
            write!(f, " | buffer {v}")?;
        }
        if let Some(v) = self.total_generated {
            write!(f, " | generated {v}")?;
        }
        if let Some(v) = self.chi_square {
            write!(f, " | chi2 {v:.2}")?;
            if self.chi_warning {
                f.write_str(" (!)")?;
            }
        }
        if let Some(v) = self.rejected_frames {
            write!(f, " | rejected {v}")?;
        }
        if let Some(v) = self.corrupt_pixel_percent {
            write!(f, " | oversaturated {v:.2}%")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_suppressed() {
        let report = StatsReport::from_sample(&QualitySample::default(), Duration::ZERO, false);
        assert_eq!(report.buffer_position, None);
        assert_eq!(report.total_generated, None);
        assert_eq!(report.chi_square, None);
        assert_eq!(report.rejected_frames, None);
        assert_eq!(report.corrupt_pixel_percent, None);
        assert_eq!(report.to_string(), "elapsed 00:00");
    }

    #[test]
    fn test_values_surfaced() {
        let sample = QualitySample {
            chi_square: 301.456,
            rejected_frames: 3,
            corrupt_pixel_percent: 0.25,
            buffer_position: 1200,
            total_generated: 8192,
        };
        let report = StatsReport::from_sample(&sample, Duration::from_secs(75), true);

        assert_eq!(report.elapsed_clock(), "01:15");
        assert_eq!(
            report.to_string(),
            "elapsed 01:15 | buffer 1200 | generated 8192 | chi2 301.46 (!) | rejected 3 | oversaturated 0.25%"
        );
    }
}
