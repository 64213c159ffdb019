//! Simplified reference tissue model (SRTM) estimators
//!
//! | Model | Method | Results |
//! |-------|--------|---------|
//! | [`SrtmZhou2003`] | linearized WLR, optional LRSC refinement | BP, DVR, R1, k2, k2a, LRSC, noise variances |
//! | [`SrtmLammertsma1996`] | nonlinear least squares, basin hopping | BP, R1, k2 |
//! | [`SrtmGunn1997`] | profile over θ3 with inner WLR | BP, R1, k2 |
//!
//! The operational equation shared by the nonlinear estimators is
//!
//! ```text
//! C(t) = R1·Cr(t) + (k2 − R1·k2a) · Cr(t) ⊗ exp(−k2a·t),   k2a = k2 / (1 + BP)
//! ```

pub mod gunn;
pub mod lammertsma;
pub mod zhou;

use std::{fmt, str::FromStr};

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

pub use gunn::{GunnResult, ProfileOptions, SrtmGunn1997};
pub use lammertsma::{LammertsmaResult, SrtmLammertsma1996};
pub use zhou::{FitDiagnostics, SrtmZhou2003, ZhouResult};

use crate::error::KineticModelError;
use crate::integrate::{convolve_exp, cumulative_trapezoid, StartActivity};
use crate::model::KineticData;

/// The implemented estimators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "SRTM_Zhou2003")]
    Zhou2003,
    #[serde(rename = "SRTM_Lammertsma1996")]
    Lammertsma1996,
    #[serde(rename = "SRTM_Gunn1997")]
    Gunn1997,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Zhou2003 => "SRTM_Zhou2003",
            ModelKind::Lammertsma1996 => "SRTM_Lammertsma1996",
            ModelKind::Gunn1997 => "SRTM_Gunn1997",
        }
    }
}

impl FromStr for ModelKind {
    type Err = KineticModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SRTM_Zhou2003" => Ok(ModelKind::Zhou2003),
            "SRTM_Lammertsma1996" => Ok(ModelKind::Lammertsma1996),
            "SRTM_Gunn1997" => Ok(ModelKind::Gunn1997),
            other => Err(KineticModelError::invalid(format!(
                "model must be one of: SRTM_Zhou2003, SRTM_Lammertsma1996, SRTM_Gunn1997 (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Read-only per-fit inputs shared by every row
pub(crate) struct RowContext<'a> {
    pub t: ArrayView1<'a, f64>,
    pub ref_tac: ArrayView1<'a, f64>,
    pub int_ref: Array1<f64>,
    pub start_activity: StartActivity,
}

impl<'a> RowContext<'a> {
    pub fn new(data: &'a KineticData) -> Self {
        let t = data.t();
        let ref_tac = data.ref_tac();
        let start_activity = data.start_activity();
        Self {
            t,
            ref_tac,
            int_ref: cumulative_trapezoid(ref_tac, t, start_activity),
            start_activity,
        }
    }

    pub fn integrate(&self, curve: ArrayView1<f64>) -> Array1<f64> {
        cumulative_trapezoid(curve, self.t, self.start_activity)
    }

    /// Reference TAC convolved with `exp(-rate·t)`
    pub fn convolve(&self, rate: f64) -> Array1<f64> {
        convolve_exp(self.ref_tac, self.t, rate, self.start_activity)
    }

    pub fn srtm(&self, bp: f64, r1: f64, k2: f64) -> Array1<f64> {
        operational_equation(self.t, self.ref_tac, bp, r1, k2, self.start_activity)
    }
}

fn operational_equation(
    t: ArrayView1<f64>,
    ref_tac: ArrayView1<f64>,
    bp: f64,
    r1: f64,
    k2: f64,
    start_activity: StartActivity,
) -> Array1<f64> {
    let k2a = k2 / (bp + 1.0);
    let conv = convolve_exp(ref_tac, t, k2a, start_activity);
    let mut est = &ref_tac * r1;
    est.scaled_add(k2 - r1 * k2a, &conv);
    est
}

/// Simulate a target TAC from a reference TAC with the SRTM operational
/// equation
///
/// `t` is in minutes and `k2` in 1/min. The convolution uses the same
/// discrete integral (and [`StartActivity`] seed) as the estimators, so data
/// generated here is fitted exactly by [`SrtmLammertsma1996`] and
/// [`SrtmGunn1997`].
pub fn srtm_tac(
    t: ArrayView1<f64>,
    ref_tac: ArrayView1<f64>,
    bp: f64,
    r1: f64,
    k2: f64,
    start_activity: StartActivity,
) -> Result<Array1<f64>, KineticModelError> {
    if t.len() != ref_tac.len() {
        return Err(KineticModelError::invalid(format!(
            "refTAC and t must have same length ({} != {})",
            ref_tac.len(),
            t.len()
        )));
    }
    if t.is_empty() {
        return Err(KineticModelError::invalid("t must contain at least one frame"));
    }
    Ok(operational_equation(t, ref_tac, bp, r1, k2, start_activity))
}
