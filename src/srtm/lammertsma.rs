//! SRTM fitted by nonlinear weighted least squares
//!
//! Lammertsma AA, Hume SP. Simplified reference tissue model for PET receptor
//! studies. NeuroImage. 1996;4:153–158.
//!
//! Each row minimizes `Σ w·(C − Ĉ(BP, R1, k2))²` with [`BasinHopping`] over
//! BP ∈ [0, 20], R1 ∈ [0, 10], k2 ∈ [0, 2] starting from (1, 1, 0.1).

use rayon::prelude::*;

use super::RowContext;
use crate::error::KineticModelError;
use crate::model::results::result_names;
use crate::model::{KineticData, KineticModel, Results};
use crate::optimize::{BasinHopping, BasinHoppingOptions, BasinHoppingResult};

result_names! {
    /// Results of [`SrtmLammertsma1996`]
    pub enum LammertsmaResult {
        Bp => "BP",
        R1 => "R1",
        K2 => "k2",
    }
}

/// Box for (BP, R1, k2)
pub const BOUNDS: [(f64, f64); 3] = [(0.0, 20.0), (0.0, 10.0), (0.0, 2.0)];
/// Start point for (BP, R1, k2)
pub const X0: [f64; 3] = [1.0, 1.0, 0.1];

#[derive(Debug, Clone)]
pub struct SrtmLammertsma1996 {
    data: KineticData,
    results: Results<LammertsmaResult>,
    options: BasinHoppingOptions,
    residual: Vec<f64>,
}

impl KineticModel for SrtmLammertsma1996 {
    type Output = LammertsmaResult;

    fn new(data: KineticData) -> Self {
        let rows = data.n_rows();
        Self {
            data,
            results: Results::new(rows),
            options: BasinHoppingOptions::default(),
            residual: vec![f64::NAN; rows],
        }
    }

    fn data(&self) -> &KineticData {
        &self.data
    }

    fn results(&self) -> &Results<LammertsmaResult> {
        &self.results
    }

    fn fit(&mut self) -> Result<&mut Self, KineticModelError> {
        self.options.validate().map_err(KineticModelError::invalid)?;

        let ctx = RowContext::new(&self.data);
        let options = &self.options;
        let data = &self.data;

        let fits: Vec<Option<BasinHoppingResult>> = (0..data.n_rows())
            .into_par_iter()
            .map(|row| {
                if !data.has_usable_weights(row) {
                    return None;
                }
                let tac = data.tac().row(row);
                let w = data.weights().row(row);
                let objective = |x: &[f64]| {
                    let est = ctx.srtm(x[0], x[1], x[2]);
                    est.iter()
                        .zip(tac.iter())
                        .zip(w.iter())
                        .map(|((e, c), wi)| wi * (c - e).powi(2))
                        .sum::<f64>()
                };
                let seed = options.seed.wrapping_add(row as u64);
                let res = BasinHopping::new(objective, &BOUNDS, options).minimize(&X0, seed);
                if res.local_failures > 0 {
                    tracing::debug!(
                        "row {}: {} of {} local searches failed",
                        row,
                        res.local_failures,
                        options.niter + 1
                    );
                }
                Some(res)
            })
            .collect();

        for (row, fit) in fits.into_iter().enumerate() {
            let Some(fit) = fit else {
                tracing::warn!("row {} has unusable weights, leaving its results as NaN", row);
                continue;
            };
            self.results.set(LammertsmaResult::Bp, row, fit.x[0]);
            self.results.set(LammertsmaResult::R1, row, fit.x[1]);
            self.results.set(LammertsmaResult::K2, row, fit.x[2]);
            self.residual[row] = fit.cost;
        }

        Ok(self)
    }
}

impl SrtmLammertsma1996 {
    /// Replace the basin hopping configuration
    pub fn with_options(mut self, options: BasinHoppingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BasinHoppingOptions {
        &self.options
    }

    /// Weighted residual sum of squares of each row at its estimate
    pub fn residual(&self) -> &[f64] {
        &self.residual
    }
}
