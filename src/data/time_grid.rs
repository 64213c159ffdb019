use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::units::TimeUnit;
use crate::error::KineticModelError;

/// Frame timing of a dynamic acquisition, in minutes
///
/// Holds the frame mid-times `t` and frame durations `dt`. A [`TimeGrid`] can
/// only be obtained through one of the validating constructors, so holders
/// may rely on:
///
/// - `t` and `dt` have the same, non-zero length
/// - `t[0] >= 0` and `t` is strictly increasing
/// - every `dt > 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    t: Array1<f64>,
    dt: Array1<f64>,
}

impl TimeGrid {
    /// Create a grid from frame mid-times and durations given in `unit`
    pub fn new(
        mid_times: Array1<f64>,
        durations: Array1<f64>,
        unit: TimeUnit,
    ) -> Result<Self, KineticModelError> {
        if mid_times.len() != durations.len() {
            return Err(KineticModelError::invalid(format!(
                "t and dt must have same length ({} != {})",
                mid_times.len(),
                durations.len()
            )));
        }
        if mid_times.is_empty() {
            return Err(KineticModelError::invalid("t must contain at least one frame"));
        }
        if mid_times.iter().chain(durations.iter()).any(|v| !v.is_finite()) {
            return Err(KineticModelError::invalid("t and dt must be finite"));
        }

        let factor = unit.to_minutes_factor();
        let t = mid_times.mapv(|v| v * factor);
        let dt = durations.mapv(|v| v * factor);

        if t[0] < 0.0 {
            return Err(KineticModelError::invalid("Time of initial frame must be >= 0"));
        }
        if !strictly_increasing(&t.to_vec()) {
            return Err(KineticModelError::invalid(
                "Time values must be strictly increasing",
            ));
        }
        if dt.iter().any(|&d| d <= 0.0) {
            return Err(KineticModelError::invalid("Time frame durations must be > 0"));
        }

        Ok(Self { t, dt })
    }

    /// Create a grid already expressed in minutes
    pub fn minutes(mid_times: Array1<f64>, durations: Array1<f64>) -> Result<Self, KineticModelError> {
        Self::new(mid_times, durations, TimeUnit::Minutes)
    }

    /// Create a grid from frame start and end times
    ///
    /// Mid-times are `(start + end) / 2`, durations are `end - start`.
    pub fn from_frame_bounds(
        start: &[f64],
        end: &[f64],
        unit: TimeUnit,
    ) -> Result<Self, KineticModelError> {
        if start.len() != end.len() {
            return Err(KineticModelError::invalid(format!(
                "frame start and end times must have same length ({} != {})",
                start.len(),
                end.len()
            )));
        }
        let mid = start.iter().zip(end).map(|(s, e)| (s + e) / 2.0).collect();
        let dur = start.iter().zip(end).map(|(s, e)| e - s).collect();
        Self::new(mid, dur, unit)
    }

    /// Frame mid-times in minutes
    pub fn t(&self) -> &Array1<f64> {
        &self.t
    }

    /// Frame durations in minutes
    pub fn dt(&self) -> &Array1<f64> {
        &self.dt
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }
}

pub(crate) fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn converts_seconds_to_minutes() {
        let grid =
            TimeGrid::new(array![30.0, 90.0, 150.0], array![60.0, 60.0, 60.0], TimeUnit::Seconds)
                .unwrap();
        assert_eq!(grid.t(), &array![0.5, 1.5, 2.5]);
        assert_eq!(grid.dt(), &array![1.0, 1.0, 1.0]);
    }

    #[test]
    fn rejects_non_increasing_times() {
        let err = TimeGrid::minutes(array![0.5, 0.5, 2.5], array![1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, KineticModelError::InvalidInput(_)));
    }

    #[test]
    fn rejects_negative_start_and_durations() {
        assert!(TimeGrid::minutes(array![-0.5, 1.5], array![1.0, 1.0]).is_err());
        assert!(TimeGrid::minutes(array![0.5, 1.5], array![1.0, 0.0]).is_err());
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(TimeGrid::minutes(array![0.5, 1.5], array![1.0]).is_err());
    }

    #[test]
    fn builds_from_frame_bounds() {
        let grid =
            TimeGrid::from_frame_bounds(&[0.0, 60.0, 180.0], &[60.0, 180.0, 480.0], TimeUnit::Seconds)
                .unwrap();
        assert_eq!(grid.t(), &array![0.5, 2.0, 5.5]);
        assert_eq!(grid.dt(), &array![1.0, 2.0, 5.0]);
    }
}
