//! SRTM fitted by profiling over the apparent efflux rate
//!
//! Gunn RN, Lammertsma AA, Hume SP, Cunningham VJ. Parametric imaging of
//! ligand-receptor binding in PET using a simplified reference region model.
//! NeuroImage. 1997;6:279–287.
//!
//! For a fixed θ3 the operational equation is linear in `(R1, k2 − R1·θ3)`,
//! so each row profiles θ3 with a bounded Brent search whose cost is the
//! weighted RSS of the inner regression on `[Cr, Cr ⊗ exp(−θ3·t)]`.

use argmin::{
    core::{CostFunction, Error, Executor},
    solver::brent::BrentOpt,
};
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::RowContext;
use crate::error::KineticModelError;
use crate::model::results::result_names;
use crate::model::wls::{design, weighted_solve, WlsFit};
use crate::model::{KineticData, KineticModel, Results};

result_names! {
    /// Results of [`SrtmGunn1997`]
    pub enum GunnResult {
        Bp => "BP",
        R1 => "R1",
        K2 => "k2",
    }
}

/// Bounded scalar search over θ3
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Search interval for θ3 in 1/min (default: 0.06 to 0.6)
    pub bounds: (f64, f64),
    /// Absolute tolerance on θ3 (default: 0.1)
    pub xatol: f64,
    /// Iteration limit of the Brent search (default: 500)
    pub max_iters: u64,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            bounds: (0.06, 0.6),
            xatol: 0.1,
            max_iters: 500,
        }
    }
}

impl ProfileOptions {
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = (lower, upper);
        self
    }

    pub fn with_xatol(mut self, xatol: f64) -> Self {
        self.xatol = xatol;
        self
    }

    fn validate(&self) -> Result<(), KineticModelError> {
        let (lo, hi) = self.bounds;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(KineticModelError::invalid(format!(
                "θ3 bounds must be finite with lower < upper, got ({}, {})",
                lo, hi
            )));
        }
        if !(self.xatol > 0.0) {
            return Err(KineticModelError::invalid(format!(
                "xatol must be positive, got {}",
                self.xatol
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SrtmGunn1997 {
    data: KineticData,
    results: Results<GunnResult>,
    options: ProfileOptions,
    theta3: Vec<f64>,
}

impl KineticModel for SrtmGunn1997 {
    type Output = GunnResult;

    fn new(data: KineticData) -> Self {
        let rows = data.n_rows();
        Self {
            data,
            results: Results::new(rows),
            options: ProfileOptions::default(),
            theta3: vec![f64::NAN; rows],
        }
    }

    fn data(&self) -> &KineticData {
        &self.data
    }

    fn results(&self) -> &Results<GunnResult> {
        &self.results
    }

    /// Fit every row; a singular inner regression fails the fit with
    /// [`KineticModelError::SingularSystem`] after the other rows are stored
    fn fit(&mut self) -> Result<&mut Self, KineticModelError> {
        self.options.validate()?;

        let ctx = RowContext::new(&self.data);
        let data = &self.data;
        let options = &self.options;

        let fits: Vec<Result<RowFit, KineticModelError>> = (0..data.n_rows())
            .into_par_iter()
            .map(|row| {
                let profile = Profile {
                    ctx: &ctx,
                    tac: data.tac().row(row),
                    w: data.weights().row(row),
                    row,
                };
                profile.fit(options)
            })
            .collect();

        let mut first_error = None;
        for (row, fit) in fits.into_iter().enumerate() {
            match fit {
                Ok(fit) => {
                    self.results.set(GunnResult::Bp, row, fit.bp);
                    self.results.set(GunnResult::R1, row, fit.r1);
                    self.results.set(GunnResult::K2, row, fit.k2);
                    self.theta3[row] = fit.theta3;
                }
                Err(e) => {
                    tracing::warn!("row {} could not be fitted: {}", row, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

impl SrtmGunn1997 {
    /// Replace the θ3 search configuration
    pub fn with_options(mut self, options: ProfileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ProfileOptions {
        &self.options
    }

    /// θ3 (the apparent efflux rate k2a) selected for each row
    pub fn theta3(&self) -> &[f64] {
        &self.theta3
    }
}

#[derive(Debug, Clone, Copy)]
struct RowFit {
    bp: f64,
    r1: f64,
    k2: f64,
    theta3: f64,
}

/// Inner regression of a single row as a function of θ3
struct Profile<'a, 'b> {
    ctx: &'b RowContext<'a>,
    tac: ArrayView1<'a, f64>,
    w: ArrayView1<'a, f64>,
    row: usize,
}

impl Profile<'_, '_> {
    fn regress(&self, theta3: f64) -> Result<WlsFit, KineticModelError> {
        let conv = self.ctx.convolve(theta3);
        let x = design(&[self.ctx.ref_tac.view(), conv.view()]);
        weighted_solve(&x, self.tac, self.w, None)
            .map_err(|e| KineticModelError::singular(self.row, e))
    }

    fn fit(self, options: &ProfileOptions) -> Result<RowFit, KineticModelError> {
        let (lo, hi) = options.bounds;
        let solver = BrentOpt::new(lo, hi).set_tolerance(f64::EPSILON.sqrt(), options.xatol / 3.0);
        let row = self.row;

        let res = Executor::new(&self, solver)
            .configure(|state| state.max_iters(options.max_iters))
            .run()
            .map_err(|e| optimization_error(row, e))?;
        let theta3 = res
            .state
            .best_param
            .ok_or_else(|| KineticModelError::Optimization {
                row,
                reason: "profile search returned no θ3".to_string(),
            })?;

        let fit = self.regress(theta3)?;
        let r1 = fit.coefficients[0];
        let k2 = fit.coefficients[1] + r1 * theta3;
        Ok(RowFit {
            bp: k2 / theta3 - 1.0,
            r1,
            k2,
            theta3,
        })
    }
}

impl CostFunction for &Profile<'_, '_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, theta3: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.regress(*theta3)?.rss)
    }
}

/// Recover our own error if the cost function raised it
fn optimization_error(row: usize, err: Error) -> KineticModelError {
    match err.downcast::<KineticModelError>() {
        Ok(e) => e,
        Err(other) => KineticModelError::Optimization {
            row,
            reason: other.to_string(),
        },
    }
}
