//! Weighted linear least squares via the normal equations
//!
//! Solves `(XᵀWX + H) b = XᵀWy + H b₀` where `W = diag(w)` and the optional
//! ridge term `H = diag(h)` pulls the solution towards `b₀`. Failure to solve
//! is reported as a [`SingularSystem`] value; each estimator decides whether
//! to degrade or propagate. Non-finite weights count as a failed solve.

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;
use thiserror::Error;

/// The normal-equation matrix could not be inverted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("normal equations are singular")]
pub struct SingularSystem;

/// Ridge penalty `H = diag(h)` towards the prior coefficients `b₀`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ridge<'a> {
    pub h: &'a [f64],
    pub prior: &'a [f64],
}

#[derive(Debug, Clone)]
pub(crate) struct WlsFit {
    pub coefficients: DVector<f64>,
    /// Weighted residual sum of squares `rᵀWr`
    pub rss: f64,
}

impl WlsFit {
    /// Unbiased noise variance `rᵀWr / (n - m)`
    ///
    /// Zero residual degrees of freedom yield 0.
    pub fn noise_variance(&self, n_obs: usize) -> f64 {
        let m = self.coefficients.len();
        if n_obs > m {
            self.rss / (n_obs - m) as f64
        } else {
            0.0
        }
    }
}

/// Build a design matrix from column views
pub(crate) fn design(columns: &[ArrayView1<f64>]) -> DMatrix<f64> {
    let n = columns.first().map_or(0, |c| c.len());
    DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i])
}

pub(crate) fn weighted_solve(
    x: &DMatrix<f64>,
    y: ArrayView1<f64>,
    w: ArrayView1<f64>,
    ridge: Option<Ridge<'_>>,
) -> Result<WlsFit, SingularSystem> {
    if w.iter().any(|wi| !wi.is_finite()) {
        return Err(SingularSystem);
    }
    let n = x.nrows();
    let m = x.ncols();
    let y = DVector::from_iterator(n, y.iter().copied());

    // XᵀW, scaling each column of Xᵀ by its frame weight
    let mut xtw = x.transpose();
    for (j, &wj) in w.iter().enumerate() {
        xtw.column_mut(j).scale_mut(wj);
    }
    let mut lhs = &xtw * x;
    let mut rhs = &xtw * &y;

    if let Some(Ridge { h, prior }) = ridge {
        for k in 0..m {
            lhs[(k, k)] += h[k];
            rhs[k] += h[k] * prior[k];
        }
    }

    let coefficients = lhs.lu().solve(&rhs).ok_or(SingularSystem)?;
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(SingularSystem);
    }

    let residual = &y - x * &coefficients;
    let rss = residual
        .iter()
        .zip(w.iter())
        .map(|(r, wi)| wi * r * r)
        .sum();

    Ok(WlsFit { coefficients, rss })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn recovers_exact_line() {
        let ones = array![1.0, 1.0, 1.0, 1.0];
        let x = array![0.0, 1.0, 2.0, 3.0];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let w = array![0.25, 0.25, 0.25, 0.25];
        let fit = weighted_solve(&design(&[ones.view(), x.view()]), y.view(), w.view(), None)
            .unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert!(fit.rss < 1e-20);
        assert!(fit.noise_variance(4) < 1e-20);
    }

    #[test]
    fn collinear_design_is_singular() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![2.0, 4.0, 6.0];
        let w = array![1.0, 1.0, 1.0];
        let res = weighted_solve(&design(&[a.view(), b.view()]), a.view(), w.view(), None);
        assert_eq!(res.unwrap_err(), SingularSystem);
    }

    #[test]
    fn ridge_regularizes_singular_design() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![2.0, 4.0, 6.0];
        let w = array![1.0, 1.0, 1.0];
        let ridge = Ridge {
            h: &[1.0, 1.0],
            prior: &[0.0, 0.0],
        };
        assert!(weighted_solve(&design(&[a.view(), b.view()]), a.view(), w.view(), Some(ridge))
            .is_ok());
    }

    #[test]
    fn zero_weighted_frames_are_ignored() {
        let ones = array![1.0, 1.0, 1.0];
        let y = array![2.0, 2.0, 100.0];
        let w = array![0.5, 0.5, 0.0];
        let fit = weighted_solve(&design(&[ones.view()]), y.view(), w.view(), None).unwrap();
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_weights_fail_the_solve() {
        let ones = array![1.0, 1.0, 1.0];
        let w = array![f64::NAN, f64::NAN, f64::NAN];
        let res = weighted_solve(&design(&[ones.view()]), ones.view(), w.view(), None);
        assert_eq!(res.unwrap_err(), SingularSystem);
    }
}
