//! Cumulative integration of time activity curves
//!
//! The integral of a curve over `[0, t[i]]` is built from two parts: an
//! initial segment `[0, t[0])` whose value depends on the assumed curve shape
//! before the first frame ([`StartActivity`]), followed by linear trapezoids
//! between consecutive frame mid-times.
//!
//! ```text
//! I[0] = initial(StartActivity)
//! I[i] = I[i-1] + (t[i] - t[i-1]) × (C[i] + C[i-1]) / 2
//! ```

use std::{fmt, str::FromStr};

use ndarray::{Array1, ArrayD, ArrayView1, Ix1, Zip};
use serde::{Deserialize, Serialize};

use crate::error::KineticModelError;

/// Assumed curve shape on `[0, t[0])`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartActivity {
    /// `C(t) = C(t0)`, integral `t0 × C(t0)`
    #[default]
    Flat,
    /// `C(t) = C(t0) / t0 × t`, integral `t0 × C(t0) / 2`
    Increasing,
    /// `C(t) = 0`, integral `0`
    Zero,
}

impl StartActivity {
    /// Integral of the curve over `[0, t0)`
    #[inline]
    pub fn initial_integral(self, t0: f64, c0: f64) -> f64 {
        match self {
            StartActivity::Flat => t0 * c0,
            StartActivity::Increasing => t0 * c0 / 2.0,
            StartActivity::Zero => 0.0,
        }
    }
}

impl FromStr for StartActivity {
    type Err = KineticModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(StartActivity::Flat),
            "increasing" => Ok(StartActivity::Increasing),
            "zero" => Ok(StartActivity::Zero),
            other => Err(KineticModelError::invalid(format!(
                "startActivity must be one of: flat, increasing, zero (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for StartActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StartActivity::Flat => "flat",
            StartActivity::Increasing => "increasing",
            StartActivity::Zero => "zero",
        };
        write!(f, "{}", s)
    }
}

/// Cumulative trapezoidal integral of `curve` over `t`
///
/// # Errors
///
/// [`KineticModelError::InvalidInput`] if `curve` and `t` differ in length or
/// are empty.
///
/// # Examples
///
/// ```rust
/// use kineticmodel::integrate::{integrate, StartActivity};
/// use ndarray::array;
///
/// let t = array![1.0, 2.0, 3.0];
/// let c = array![2.0, 2.0, 4.0];
/// let int = integrate(c.view(), t.view(), StartActivity::Flat).unwrap();
/// assert_eq!(int, array![2.0, 4.0, 7.0]);
/// ```
pub fn integrate(
    curve: ArrayView1<f64>,
    t: ArrayView1<f64>,
    start_activity: StartActivity,
) -> Result<Array1<f64>, KineticModelError> {
    if curve.len() != t.len() {
        return Err(KineticModelError::invalid(format!(
            "TAC and t must have same length ({} != {})",
            curve.len(),
            t.len()
        )));
    }
    if t.is_empty() {
        return Err(KineticModelError::invalid("TAC must contain at least one value"));
    }
    Ok(cumulative_trapezoid(curve, t, start_activity))
}

/// Like [`integrate`], for inputs whose dimensionality is only known at runtime
pub fn integrate_dyn(
    curve: &ArrayD<f64>,
    t: &ArrayD<f64>,
    start_activity: StartActivity,
) -> Result<Array1<f64>, KineticModelError> {
    if curve.ndim() != 1 || t.ndim() != 1 {
        return Err(KineticModelError::invalid("TAC and t must be 1-dimensional"));
    }
    let curve = curve
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|e| KineticModelError::invalid(e.to_string()))?;
    let t = t
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|e| KineticModelError::invalid(e.to_string()))?;
    integrate(curve, t, start_activity)
}

/// Unchecked core of [`integrate`]; callers guarantee equal, non-zero lengths
pub(crate) fn cumulative_trapezoid(
    curve: ArrayView1<f64>,
    t: ArrayView1<f64>,
    start_activity: StartActivity,
) -> Array1<f64> {
    let n = t.len();
    let mut out = Array1::zeros(n);
    out[0] = start_activity.initial_integral(t[0], curve[0]);
    for i in 1..n {
        out[i] = out[i - 1] + (t[i] - t[i - 1]) * (curve[i] + curve[i - 1]) / 2.0;
    }
    out
}

/// Convolution of `reference` with `exp(-rate × t)`
///
/// Evaluated as `∫ ref(s) exp(rate s) ds / exp(rate t)`, with the integral
/// computed by [`cumulative_trapezoid`] under `start_activity`.
pub(crate) fn convolve_exp(
    reference: ArrayView1<f64>,
    t: ArrayView1<f64>,
    rate: f64,
    start_activity: StartActivity,
) -> Array1<f64> {
    let growth = t.mapv(|ti| (rate * ti).exp());
    let integrand = &reference * &growth;
    let mut conv = cumulative_trapezoid(integrand.view(), t, start_activity);
    Zip::from(&mut conv).and(&growth).for_each(|c, &g| *c /= g);
    conv
}
