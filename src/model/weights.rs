//! Frame weighting policies
//!
//! Weights play the role of the precision (inverse variance) of each frame.
//! Every policy produces a raw `rows × frames` matrix which is then
//! sanitized: negative entries are flipped to their absolute value and each
//! row is scaled to sum to 1. A row that cannot be scaled (a zero activity
//! frame under activity weighting, or all-zero weights) is filled with NaN
//! and reported, so only that row fails to fit.

use std::f64::consts::LN_2;

use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::data::{TimeGrid, TimeQuantity};
use crate::error::KineticModelError;

/// How frame weights are derived
///
/// Variants that need auxiliary inputs carry them, so a decay-corrected
/// policy without a half-life cannot be expressed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every frame weighted equally
    None,
    /// Proportional to `dt`
    #[default]
    FrameDuration,
    /// Proportional to `dt / TAC`
    FrameDurationActivity,
    /// Proportional to `dt / (TAC × exp(λt))`, `λ = ln 2 / halflife`
    FrameDurationActivityDecay { halflife: TimeQuantity },
    /// Proportional to `dt² / (trues × exp(λt)²)`
    Trues {
        halflife: TimeQuantity,
        trues: Array1<f64>,
    },
    /// One weight per frame, shared by every row
    Custom(Array1<f64>),
    /// One weight per row and frame; must match the TAC shape
    CustomMatrix(Array2<f64>),
}

impl Weighting {
    /// Half-life carried by the policy, if any
    pub fn halflife(&self) -> Option<TimeQuantity> {
        match self {
            Weighting::FrameDurationActivityDecay { halflife }
            | Weighting::Trues { halflife, .. } => Some(*halflife),
            _ => None,
        }
    }
}

/// Validate a half-life and return it in minutes
pub(crate) fn halflife_minutes(halflife: &TimeQuantity) -> Result<f64, KineticModelError> {
    let minutes = halflife.as_minutes();
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(KineticModelError::invalid(format!(
            "Halflife should be positive (got {})",
            halflife
        )));
    }
    Ok(minutes)
}

/// Derived, normalized weight matrix
#[derive(Debug, Clone)]
pub(crate) struct DerivedWeights {
    pub weights: Array2<f64>,
    /// Number of entries that were negative before sanitizing
    pub negatives_replaced: usize,
    /// Rows whose raw weights were not finite or summed to zero; left as NaN
    pub unusable_rows: Vec<usize>,
}

pub(crate) fn derive_weights(
    weighting: &Weighting,
    time: &TimeGrid,
    tac: &Array2<f64>,
) -> Result<DerivedWeights, KineticModelError> {
    let (rows, frames) = tac.dim();
    let t = time.t();
    let dt = time.dt();

    let decay = |halflife: &TimeQuantity| -> Result<Array1<f64>, KineticModelError> {
        let lambda = LN_2 / halflife_minutes(halflife)?;
        Ok(t.mapv(|ti| (lambda * ti).exp()))
    };

    let raw = match weighting {
        Weighting::None => Array2::ones((rows, frames)),
        Weighting::FrameDuration => broadcast_rows(dt, rows),
        Weighting::FrameDurationActivity => {
            let mut w = broadcast_rows(dt, rows);
            w /= tac;
            w
        }
        Weighting::FrameDurationActivityDecay { halflife } => {
            let decay = decay(halflife)?;
            let mut w = broadcast_rows(dt, rows);
            Zip::from(&mut w)
                .and(tac)
                .and_broadcast(&decay)
                .for_each(|w, &c, &d| *w /= c * d);
            w
        }
        Weighting::Trues { halflife, trues } => {
            if trues.len() != frames {
                return Err(KineticModelError::invalid(format!(
                    "Trues must have same length as t ({} != {})",
                    trues.len(),
                    frames
                )));
            }
            if trues.iter().any(|v| !v.is_finite()) {
                return Err(KineticModelError::invalid("Trues must consist of finite values"));
            }
            let decay = decay(halflife)?;
            let per_frame = Zip::from(dt)
                .and(trues)
                .and(&decay)
                .map_collect(|&d, &tr, &dc| d * d / (tr * dc * dc));
            broadcast_rows(&per_frame, rows)
        }
        Weighting::Custom(w) => {
            if w.len() != frames {
                return Err(KineticModelError::invalid(format!(
                    "custom weights must be a vector of same length as t ({} != {}) or match the shape of TAC",
                    w.len(),
                    frames
                )));
            }
            check_finite(w)?;
            broadcast_rows(w, rows)
        }
        Weighting::CustomMatrix(w) => {
            check_finite(w)?;
            if w.dim() == (1, frames) && rows != 1 {
                broadcast_rows(&w.row(0).to_owned(), rows)
            } else if w.dim() == (rows, frames) {
                w.clone()
            } else {
                return Err(KineticModelError::invalid(format!(
                    "custom weights of shape {:?} match neither t ({}) nor TAC {:?}",
                    w.dim(),
                    frames,
                    (rows, frames)
                )));
            }
        }
    };

    Ok(normalize(raw))
}

fn broadcast_rows(per_frame: &Array1<f64>, rows: usize) -> Array2<f64> {
    let frames = per_frame.len();
    Array2::from_shape_fn((rows, frames), |(_, j)| per_frame[j])
}

fn normalize(mut w: Array2<f64>) -> DerivedWeights {
    let negatives_replaced = w.iter().filter(|&&v| v < 0.0).count();
    if negatives_replaced > 0 {
        tracing::warn!(
            "There are {} negative weights; will replace them with their absolute value",
            negatives_replaced
        );
        w.mapv_inplace(f64::abs);
    }

    let mut unusable_rows = Vec::new();
    for (row, mut weights) in w.axis_iter_mut(Axis(0)).enumerate() {
        let total = weights.sum();
        if total.is_finite() && total > 0.0 {
            weights /= total;
        } else {
            weights.fill(f64::NAN);
            unusable_rows.push(row);
        }
    }
    if !unusable_rows.is_empty() {
        tracing::warn!(
            "weights of {} row(s) are not finite or sum to zero; these rows cannot be fitted",
            unusable_rows.len()
        );
    }

    DerivedWeights {
        weights: w,
        negatives_replaced,
        unusable_rows,
    }
}

fn check_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Result<(), KineticModelError> {
    if values.into_iter().any(|v| !v.is_finite()) {
        return Err(KineticModelError::invalid("custom weights must consist of finite values"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn grid() -> TimeGrid {
        TimeGrid::minutes(array![0.5, 1.5, 3.0], array![1.0, 1.0, 2.0]).unwrap()
    }

    fn tac() -> Array2<f64> {
        array![[1.0, 2.0, 4.0], [2.0, -1.0, 1.0]]
    }

    fn assert_rows_sum_to_one(w: &Array2<f64>) {
        for row in w.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn none_gives_equal_weights() {
        let d = derive_weights(&Weighting::None, &grid(), &tac()).unwrap();
        for &v in d.weights.iter() {
            assert_relative_eq!(v, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn frame_duration_is_proportional_to_dt() {
        let d = derive_weights(&Weighting::FrameDuration, &grid(), &tac()).unwrap();
        assert_eq!(d.weights.row(0), array![0.25, 0.25, 0.5]);
        assert_rows_sum_to_one(&d.weights);
    }

    #[test]
    fn negative_activity_weights_are_flipped() {
        let d = derive_weights(&Weighting::FrameDurationActivity, &grid(), &tac()).unwrap();
        assert_eq!(d.negatives_replaced, 1);
        assert_rows_sum_to_one(&d.weights);
        // raw second row: 0.5, 1.0 (flipped), 2.0
        assert_relative_eq!(d.weights[[1, 1]], 1.0 / 3.5, epsilon = 1e-12);
    }

    #[test]
    fn decay_weights_fall_with_time() {
        let w = Weighting::FrameDurationActivityDecay {
            halflife: TimeQuantity::minutes(20.4),
        };
        let flat = array![[1.0, 1.0, 1.0]];
        let d = derive_weights(&w, &grid(), &flat).unwrap();
        assert!(d.weights[[0, 0]] > d.weights[[0, 1]]);
        assert_rows_sum_to_one(&d.weights);
    }

    #[test]
    fn trues_require_matching_length() {
        let w = Weighting::Trues {
            halflife: TimeQuantity::minutes(20.4),
            trues: array![100.0, 200.0],
        };
        assert!(derive_weights(&w, &grid(), &tac()).is_err());
    }

    #[test]
    fn trues_weights_are_normalized() {
        let w = Weighting::Trues {
            halflife: TimeQuantity::minutes(109.8),
            trues: array![1000.0, 800.0, 600.0],
        };
        let d = derive_weights(&w, &grid(), &tac()).unwrap();
        assert_rows_sum_to_one(&d.weights);
        assert_eq!(d.weights.row(0), d.weights.row(1));
    }

    #[test]
    fn non_positive_halflife_is_rejected() {
        let w = Weighting::FrameDurationActivityDecay {
            halflife: TimeQuantity::minutes(0.0),
        };
        assert!(derive_weights(&w, &grid(), &tac()).is_err());
    }

    #[test]
    fn custom_shapes() {
        let vector = Weighting::Custom(array![1.0, 1.0, 2.0]);
        let d = derive_weights(&vector, &grid(), &tac()).unwrap();
        assert_eq!(d.weights.row(1), array![0.25, 0.25, 0.5]);

        let matrix = Weighting::CustomMatrix(array![[1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]);
        let d = derive_weights(&matrix, &grid(), &tac()).unwrap();
        assert_eq!(d.weights.row(1), array![0.0, 0.5, 0.5]);

        let wrong = Weighting::Custom(array![1.0, 1.0]);
        assert!(derive_weights(&wrong, &grid(), &tac()).is_err());
        let wrong = Weighting::CustomMatrix(Array2::ones((3, 3)));
        assert!(derive_weights(&wrong, &grid(), &tac()).is_err());
    }

    #[test]
    fn zero_activity_marks_only_that_row_unusable() {
        let tac = array![[0.0, 1.0, 1.0], [1.0, 2.0, 4.0]];
        let d = derive_weights(&Weighting::FrameDurationActivity, &grid(), &tac).unwrap();
        assert_eq!(d.unusable_rows, vec![0]);
        assert!(d.weights.row(0).iter().all(|v| v.is_nan()));
        assert_relative_eq!(d.weights.row(1).sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_sum_custom_row_is_unusable() {
        let matrix = Weighting::CustomMatrix(array![[1.0, 1.0, 1.0], [0.0, 0.0, 0.0]]);
        let d = derive_weights(&matrix, &grid(), &tac()).unwrap();
        assert_eq!(d.unusable_rows, vec![1]);
    }

    #[test]
    fn non_finite_custom_weights_are_rejected() {
        let vector = Weighting::Custom(array![1.0, f64::INFINITY, 2.0]);
        assert!(derive_weights(&vector, &grid(), &tac()).is_err());
        let matrix = Weighting::CustomMatrix(array![[1.0, 1.0, 1.0], [f64::NAN, 1.0, 1.0]]);
        assert!(derive_weights(&matrix, &grid(), &tac()).is_err());
    }
}
