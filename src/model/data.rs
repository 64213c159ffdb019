use ndarray::{Array1, Array2, ArrayView1};

use super::weights::{derive_weights, halflife_minutes, Weighting};
use crate::data::{TacInput, TimeGrid};
use crate::error::KineticModelError;
use crate::integrate::StartActivity;

/// Validated inputs shared by every kinetic model
///
/// Built through [`KineticData::builder`]. Construction either fails with
/// [`KineticModelError::InvalidInput`] before anything is fitted, or yields
/// data that every estimator can use without further checks:
///
/// - times in minutes, strictly increasing, durations positive
/// - `tac` is `rows × frames` with finite values, `ref_tac` has `frames` values
/// - `weights` has the shape of `tac`, non-negative, each row summing to 1,
///   except rows listed in [`KineticData::unusable_weight_rows`], which are NaN
#[derive(Debug, Clone)]
pub struct KineticData {
    time: TimeGrid,
    tac: Array2<f64>,
    ref_tac: Array1<f64>,
    weights: Array2<f64>,
    start_activity: StartActivity,
    halflife: Option<f64>,
    row_names: Option<Vec<String>>,
    negative_weights: usize,
    unusable_weight_rows: Vec<usize>,
}

impl KineticData {
    /// Start building model inputs from a time grid, target TAC(s) and a
    /// reference TAC
    pub fn builder(
        time: TimeGrid,
        tac: impl Into<TacInput>,
        ref_tac: Array1<f64>,
    ) -> KineticDataBuilder {
        KineticDataBuilder {
            time,
            tac: tac.into(),
            ref_tac,
            start_activity: StartActivity::default(),
            weighting: Weighting::default(),
            row_names: None,
        }
    }

    pub fn time(&self) -> &TimeGrid {
        &self.time
    }

    /// Frame mid-times in minutes
    pub fn t(&self) -> ArrayView1<'_, f64> {
        self.time.t().view()
    }

    /// Target TACs, one row per curve
    pub fn tac(&self) -> &Array2<f64> {
        &self.tac
    }

    pub fn ref_tac(&self) -> ArrayView1<'_, f64> {
        self.ref_tac.view()
    }

    /// Normalized frame weights, same shape as [`KineticData::tac`]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn start_activity(&self) -> StartActivity {
        self.start_activity
    }

    /// Half-life in minutes, when the weighting policy carries one
    pub fn halflife(&self) -> Option<f64> {
        self.halflife
    }

    pub fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    /// Number of weights that were negative and replaced by their absolute value
    pub fn negative_weights(&self) -> usize {
        self.negative_weights
    }

    /// Rows whose derived weights were not finite or summed to zero
    ///
    /// Their weights are NaN and every estimator treats them as unfittable.
    pub fn unusable_weight_rows(&self) -> &[usize] {
        &self.unusable_weight_rows
    }

    /// Whether the weights of `row` can be used in a regression
    pub fn has_usable_weights(&self, row: usize) -> bool {
        self.unusable_weight_rows.binary_search(&row).is_err()
    }

    pub fn n_rows(&self) -> usize {
        self.tac.nrows()
    }

    pub fn n_frames(&self) -> usize {
        self.tac.ncols()
    }
}

/// Builder for [`KineticData`]
#[derive(Debug, Clone)]
pub struct KineticDataBuilder {
    time: TimeGrid,
    tac: TacInput,
    ref_tac: Array1<f64>,
    start_activity: StartActivity,
    weighting: Weighting,
    row_names: Option<Vec<String>>,
}

impl KineticDataBuilder {
    /// Assumed curve shape before the first frame (default: flat)
    pub fn start_activity(mut self, start_activity: StartActivity) -> Self {
        self.start_activity = start_activity;
        self
    }

    /// Frame weighting policy (default: frame duration)
    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Labels for the TAC rows, used when saving results
    pub fn row_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.row_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<KineticData, KineticModelError> {
        let frames = self.time.len();

        if self.ref_tac.len() != frames {
            return Err(KineticModelError::invalid(format!(
                "t, dt and refTAC must have same length ({} != {})",
                frames,
                self.ref_tac.len()
            )));
        }
        if self.ref_tac.iter().any(|v| !v.is_finite()) {
            return Err(KineticModelError::invalid("refTAC must consist of finite values"));
        }

        let single = self.tac.is_single();
        let tac = self.tac.into_rows("TAC")?;
        if tac.ncols() != frames {
            return Err(KineticModelError::invalid(if single {
                format!("TAC and t must have same length ({} != {})", tac.ncols(), frames)
            } else {
                format!(
                    "Number of columns of TAC must be the same as length of t ({} != {})",
                    tac.ncols(),
                    frames
                )
            }));
        }
        if tac.nrows() == 0 {
            return Err(KineticModelError::invalid("TAC must contain at least one row"));
        }
        if tac.iter().any(|v| !v.is_finite()) {
            return Err(KineticModelError::invalid("TAC must consist of finite values"));
        }

        if let Some(names) = &self.row_names {
            if names.len() != tac.nrows() {
                return Err(KineticModelError::invalid(format!(
                    "Number of TAC row names specified must be the same as the number of rows of TAC ({} != {})",
                    names.len(),
                    tac.nrows()
                )));
            }
        }

        let halflife = self
            .weighting
            .halflife()
            .as_ref()
            .map(halflife_minutes)
            .transpose()?;

        let derived = derive_weights(&self.weighting, &self.time, &tac)?;

        Ok(KineticData {
            time: self.time,
            tac,
            ref_tac: self.ref_tac,
            weights: derived.weights,
            start_activity: self.start_activity,
            halflife,
            row_names: self.row_names,
            negative_weights: derived.negatives_replaced,
            unusable_weight_rows: derived.unusable_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeUnit;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn grid() -> TimeGrid {
        TimeGrid::minutes(array![0.5, 1.5, 2.5], array![1.0, 1.0, 1.0]).unwrap()
    }

    #[test]
    fn minimal_single_curve() {
        let data = KineticData::builder(grid(), array![0.0, 0.5, 0.8], array![1.0, 1.2, 1.0])
            .weighting(Weighting::None)
            .build()
            .unwrap();
        assert_eq!(data.n_rows(), 1);
        for &w in data.weights().iter() {
            assert_relative_eq!(w, 1.0 / 3.0, epsilon = 1e-12);
        }
        assert_eq!(data.start_activity(), StartActivity::Flat);
        assert!(data.halflife().is_none());
    }

    #[test]
    fn rejects_non_finite_tac() {
        let err = KineticData::builder(grid(), array![0.0, f64::NAN, 0.8], array![1.0, 1.2, 1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, KineticModelError::InvalidInput(_)));
    }

    #[test]
    fn rejects_tac_length_mismatch() {
        let res = KineticData::builder(grid(), array![0.0, 0.5], array![1.0, 1.2, 1.0]).build();
        assert!(res.is_err());
        let res = KineticData::builder(grid(), array![[0.0, 0.5], [1.0, 1.0]], array![1.0, 1.2, 1.0])
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn rejects_reference_length_mismatch() {
        let res = KineticData::builder(grid(), array![0.0, 0.5, 0.8], array![1.0, 1.2]).build();
        assert!(res.is_err());
    }

    #[test]
    fn rejects_wrong_number_of_row_names() {
        let res = KineticData::builder(grid(), array![[0.0, 0.5, 0.8]], array![1.0, 1.2, 1.0])
            .row_names(["a", "b"])
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn keeps_halflife_in_minutes() {
        let data = KineticData::builder(grid(), array![1.0, 0.5, 0.8], array![1.0, 1.2, 1.0])
            .weighting(Weighting::FrameDurationActivityDecay {
                halflife: crate::data::TimeQuantity::new(1220.04, TimeUnit::Seconds),
            })
            .build()
            .unwrap();
        assert_relative_eq!(data.halflife().unwrap(), 20.334, epsilon = 1e-9);
    }

    #[test]
    fn zero_activity_frame_builds_with_unusable_row() {
        let data = KineticData::builder(grid(), array![0.0, 0.5, 0.8], array![1.0, 1.2, 1.0])
            .weighting(Weighting::FrameDurationActivity)
            .build()
            .unwrap();
        assert_eq!(data.unusable_weight_rows(), &[0]);
        assert!(!data.has_usable_weights(0));
        assert!(data.weights().iter().all(|w| w.is_nan()));
    }
}
