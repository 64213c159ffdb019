//! SRTM linearized by integration, solved by weighted linear regression
//!
//! Zhou Y, Endres CJ, Brašić JR, Huang S-C, Wong DF. Linear regression with
//! spatial constraint to generate parametric images of ligand-receptor
//! dynamic PET studies with a simplified reference tissue model.
//! NeuroImage. 2003;18:975–989.
//!
//! Two regressions are solved per TAC:
//!
//! ```text
//! DVR equation (Eq. 9):  ∫C = DVR·∫Cr + b1·Cr − b2·C        (C may be a smoothed TAC)
//! R1 equation  (Eq. 8):   C = R1·Cr + k2·∫Cr − k2a·∫C
//! ```
//!
//! [`SrtmZhou2003::refine`] solves the R1 equation again as a ridge regression
//! towards spatially smoothed estimates (LRSC, Eq. 11).

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Ix1, Ix2};
use rayon::prelude::*;

use super::RowContext;
use crate::data::TacInput;
use crate::error::KineticModelError;
use crate::model::results::result_names;
use crate::model::wls::{design, weighted_solve, Ridge, SingularSystem, WlsFit};
use crate::model::{KineticData, KineticModel, Results};

result_names! {
    /// Results of [`SrtmZhou2003`]
    pub enum ZhouResult {
        Bp => "BP",
        Dvr => "DVR",
        R1 => "R1",
        K2 => "k2",
        K2a => "k2a",
        R1Lrsc => "R1_lrsc",
        K2Lrsc => "k2_lrsc",
        K2aLrsc => "k2a_lrsc",
        NoiseVarEqDvr => "noiseVar_eqDVR",
        NoiseVarEqR1 => "noiseVar_eqR1",
    }
}

/// Rows whose normal equations were singular, or whose weights were
/// unusable, and were set to 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitDiagnostics {
    pub singular_dvr: Vec<usize>,
    pub singular_r1: Vec<usize>,
    pub singular_lrsc: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct DvrEstimate {
    dvr: f64,
    noise_var: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct R1Estimate {
    r1: f64,
    k2: f64,
    k2a: f64,
    noise_var: f64,
}

/// Number of coefficients in each regression
const M: usize = 3;

#[derive(Debug, Clone)]
pub struct SrtmZhou2003 {
    data: KineticData,
    results: Results<ZhouResult>,
    diagnostics: FitDiagnostics,
}

impl KineticModel for SrtmZhou2003 {
    type Output = ZhouResult;

    fn new(data: KineticData) -> Self {
        let results = Results::new(data.n_rows());
        Self {
            data,
            results,
            diagnostics: FitDiagnostics::default(),
        }
    }

    fn data(&self) -> &KineticData {
        &self.data
    }

    fn results(&self) -> &Results<ZhouResult> {
        &self.results
    }

    fn fit(&mut self) -> Result<&mut Self, KineticModelError> {
        self.fit_with_smoothed(None)
    }
}

impl SrtmZhou2003 {
    pub fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    /// Estimate DVR, BP, R1, k2 and k2a for every row
    ///
    /// If `smooth_tac` is given, its rows replace the target TAC in the design
    /// matrix of the DVR equation. It must have the shape of the TAC; a single
    /// curve is accepted when the model holds a single row.
    ///
    /// The LRSC results are initialized with the unconstrained R1-equation
    /// estimates and are overwritten by [`SrtmZhou2003::refine`].
    pub fn fit_with_smoothed(
        &mut self,
        smooth_tac: Option<TacInput>,
    ) -> Result<&mut Self, KineticModelError> {
        let smooth_tac = smooth_tac
            .map(|s| self.validate_smoothed(s))
            .transpose()?;

        let ctx = RowContext::new(&self.data);
        let n = self.data.n_frames();

        let outcomes: Vec<(Result<DvrEstimate, SingularSystem>, Result<R1Estimate, SingularSystem>)> =
            (0..self.data.n_rows())
                .into_par_iter()
                .map(|row| {
                    let tac = self.data.tac().row(row);
                    let w = self.data.weights().row(row);
                    let int_tac = ctx.integrate(tac);
                    let design_tac = smooth_tac.as_ref().map_or(tac, |s| s.row(row));
                    (
                        dvr_equation(&ctx, design_tac, int_tac.view(), w, n),
                        r1_equation(&ctx, tac, int_tac.view(), w, None).map(|fit| {
                            R1Estimate {
                                r1: fit.coefficients[0],
                                k2: fit.coefficients[1],
                                k2a: fit.coefficients[2],
                                noise_var: fit.noise_variance(n),
                            }
                        }),
                    )
                })
                .collect();

        self.diagnostics.singular_dvr.clear();
        self.diagnostics.singular_r1.clear();

        for (row, (dvr, r1)) in outcomes.into_iter().enumerate() {
            let (bp, dvr, noise_var_dvr) = match dvr {
                Ok(e) => (e.dvr - 1.0, e.dvr, e.noise_var),
                Err(_) => {
                    tracing::debug!("DVR equation singular for row {}, setting results to 0", row);
                    self.diagnostics.singular_dvr.push(row);
                    (0.0, 0.0, 0.0)
                }
            };
            let r1 = r1.unwrap_or_else(|_| {
                tracing::debug!("R1 equation singular for row {}, setting results to 0", row);
                self.diagnostics.singular_r1.push(row);
                R1Estimate::default()
            });

            let results = &mut self.results;
            results.set(ZhouResult::Bp, row, bp);
            results.set(ZhouResult::Dvr, row, dvr);
            results.set(ZhouResult::NoiseVarEqDvr, row, noise_var_dvr);
            results.set(ZhouResult::R1, row, r1.r1);
            results.set(ZhouResult::K2, row, r1.k2);
            results.set(ZhouResult::K2a, row, r1.k2a);
            results.set(ZhouResult::NoiseVarEqR1, row, r1.noise_var);
            results.set(ZhouResult::R1Lrsc, row, r1.r1);
            results.set(ZhouResult::K2Lrsc, row, r1.k2);
            results.set(ZhouResult::K2aLrsc, row, r1.k2a);
        }

        Ok(self)
    }

    /// Ridge regression of the R1 equation towards smoothed estimates
    ///
    /// Solves `(XᵀWX + H) b = XᵀWy + H b_sc` per row, where `H = diag(h[row])`
    /// and `b_sc = (smooth_r1, smooth_k2, smooth_k2a)[row]`, and stores the
    /// solution in `R1_lrsc`, `k2_lrsc` and `k2a_lrsc`. Singular systems set
    /// the row to 0.
    pub fn refine(
        &mut self,
        smooth_r1: ArrayView1<f64>,
        smooth_k2: ArrayView1<f64>,
        smooth_k2a: ArrayView1<f64>,
        h: ArrayView2<f64>,
    ) -> Result<&mut Self, KineticModelError> {
        let rows = self.data.n_rows();
        if smooth_r1.len() != rows || smooth_k2.len() != rows || smooth_k2a.len() != rows {
            return Err(KineticModelError::invalid(format!(
                "Length of smoothR1, smoothk2, smoothk2a must be equal to the number of rows of TAC ({})",
                rows
            )));
        }
        if h.dim() != (rows, M) {
            return Err(KineticModelError::invalid(format!(
                "h must have shape ({}, {}), got {:?}",
                rows,
                M,
                h.dim()
            )));
        }

        let ctx = RowContext::new(&self.data);

        let outcomes: Vec<Result<WlsFit, SingularSystem>> = (0..rows)
            .into_par_iter()
            .map(|row| {
                let tac = self.data.tac().row(row);
                let w = self.data.weights().row(row);
                let int_tac = ctx.integrate(tac);
                let h_row = h.row(row).to_vec();
                let prior = [smooth_r1[row], smooth_k2[row], smooth_k2a[row]];
                let ridge = Ridge {
                    h: &h_row,
                    prior: &prior,
                };
                r1_equation(&ctx, tac, int_tac.view(), w, Some(ridge))
            })
            .collect();

        self.diagnostics.singular_lrsc.clear();
        for (row, outcome) in outcomes.into_iter().enumerate() {
            let b = match outcome {
                Ok(fit) => [fit.coefficients[0], fit.coefficients[1], fit.coefficients[2]],
                Err(_) => {
                    tracing::debug!("LRSC equation singular for row {}, setting results to 0", row);
                    self.diagnostics.singular_lrsc.push(row);
                    [0.0; M]
                }
            };
            self.results.set(ZhouResult::R1Lrsc, row, b[0]);
            self.results.set(ZhouResult::K2Lrsc, row, b[1]);
            self.results.set(ZhouResult::K2aLrsc, row, b[2]);
        }

        Ok(self)
    }

    /// [`SrtmZhou2003::refine`] for inputs whose dimensionality is only known
    /// at runtime; the smoothed estimates must be 1-D and `h` 2-D
    pub fn refine_dyn(
        &mut self,
        smooth_r1: &ArrayD<f64>,
        smooth_k2: &ArrayD<f64>,
        smooth_k2a: &ArrayD<f64>,
        h: &ArrayD<f64>,
    ) -> Result<&mut Self, KineticModelError> {
        let as_1d = |a: &ArrayD<f64>| -> Result<Array1<f64>, KineticModelError> {
            a.clone().into_dimensionality::<Ix1>().map_err(|_| {
                KineticModelError::invalid("smoothR1, smoothk2, smoothk2a must be 1-D")
            })
        };
        let r1 = as_1d(smooth_r1)?;
        let k2 = as_1d(smooth_k2)?;
        let k2a = as_1d(smooth_k2a)?;
        let h = h
            .clone()
            .into_dimensionality::<Ix2>()
            .map_err(|_| KineticModelError::invalid("h must be 2-D"))?;
        self.refine(r1.view(), k2.view(), k2a.view(), h.view())
    }

    fn validate_smoothed(&self, smooth: TacInput) -> Result<Array2<f64>, KineticModelError> {
        let single = smooth.is_single();
        let smooth = smooth.into_rows("smoothTAC")?;
        if single && smooth.ncols() != self.data.n_frames() {
            return Err(KineticModelError::invalid(format!(
                "smoothTAC and t must have same length ({} != {})",
                smooth.ncols(),
                self.data.n_frames()
            )));
        }
        if smooth.dim() != self.data.tac().dim() {
            return Err(KineticModelError::invalid(format!(
                "smoothTAC and TAC must have same shape ({:?} != {:?})",
                smooth.dim(),
                self.data.tac().dim()
            )));
        }
        if smooth.iter().any(|v| !v.is_finite()) {
            return Err(KineticModelError::invalid("smoothTAC must consist of finite values"));
        }
        Ok(smooth)
    }
}

fn dvr_equation(
    ctx: &RowContext<'_>,
    design_tac: ArrayView1<f64>,
    int_tac: ArrayView1<f64>,
    w: ArrayView1<f64>,
    n: usize,
) -> Result<DvrEstimate, SingularSystem> {
    let neg_tac = design_tac.mapv(|v| -v);
    let x = design(&[ctx.int_ref.view(), ctx.ref_tac.view(), neg_tac.view()]);
    let fit = weighted_solve(&x, int_tac, w, None)?;
    Ok(DvrEstimate {
        dvr: fit.coefficients[0],
        noise_var: fit.noise_variance(n),
    })
}

fn r1_equation(
    ctx: &RowContext<'_>,
    tac: ArrayView1<f64>,
    int_tac: ArrayView1<f64>,
    w: ArrayView1<f64>,
    ridge: Option<Ridge<'_>>,
) -> Result<WlsFit, SingularSystem> {
    let neg_int_tac = int_tac.mapv(|v| -v);
    let x = design(&[ctx.ref_tac.view(), ctx.int_ref.view(), neg_int_tac.view()]);
    weighted_solve(&x, tac, w, ridge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeGrid;
    use crate::integrate::{integrate, StartActivity};
    use crate::model::Weighting;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};
    use ndarray::array;

    fn small_model() -> SrtmZhou2003 {
        let grid = TimeGrid::minutes(array![0.5, 1.5, 2.5], array![1.0, 1.0, 1.0]).unwrap();
        let data = KineticData::builder(grid, array![0.0, 0.5, 0.8], array![1.0, 1.2, 1.0])
            .weighting(Weighting::None)
            .build()
            .unwrap();
        SrtmZhou2003::new(data)
    }

    #[test]
    fn three_frame_fit_populates_every_result() {
        let mut model = small_model();
        assert!(model.results().get(ZhouResult::Bp)[0].is_nan());
        model.fit().unwrap();
        for &name in <ZhouResult as crate::model::ResultName>::ALL {
            let v = model.results().value(name, 0);
            assert!(v.is_finite(), "{:?} is {}", name, v);
        }
        assert_relative_eq!(
            model.results().value(ZhouResult::Bp, 0),
            model.results().value(ZhouResult::Dvr, 0) - 1.0,
            epsilon = 1e-12
        );
        assert!(model.diagnostics().singular_dvr.is_empty());
    }

    #[test]
    fn singular_design_degrades_to_zero() {
        // A zero reference and a zero TAC make both design matrices singular
        let grid = TimeGrid::minutes(array![0.5, 1.5, 2.5, 3.5], array![1.0, 1.0, 1.0, 1.0]).unwrap();
        let data = KineticData::builder(grid, array![[0.0, 0.0, 0.0, 0.0]], array![0.0, 0.0, 0.0, 0.0])
            .weighting(Weighting::None)
            .build()
            .unwrap();
        let mut model = SrtmZhou2003::new(data);
        model.fit().unwrap();
        for &name in <ZhouResult as crate::model::ResultName>::ALL {
            assert_eq!(model.results().value(name, 0), 0.0, "{:?}", name);
        }
        assert_eq!(model.diagnostics().singular_dvr, vec![0]);
        assert_eq!(model.diagnostics().singular_r1, vec![0]);
    }

    #[test]
    fn refine_validates_shapes() {
        let mut model = small_model();
        model.fit().unwrap();
        let ok = array![1.0];
        let bad = array![1.0, 2.0];
        assert!(model
            .refine(bad.view(), ok.view(), ok.view(), Array2::<f64>::zeros((1, 3)).view())
            .is_err());
        assert!(model
            .refine(ok.view(), ok.view(), ok.view(), Array2::<f64>::zeros((1, 2)).view())
            .is_err());
    }

    #[test]
    fn smoothed_tac_must_match_shape() {
        let mut model = small_model();
        let res = model.fit_with_smoothed(Some(array![[0.0, 0.5]].into()));
        assert!(res.is_err());
        let res = model.fit_with_smoothed(Some(array![0.0, 0.5, 0.8].into()));
        assert!(res.is_ok());
    }

    #[test]
    fn refine_dyn_rejects_matrix_estimates() {
        let mut model = small_model();
        model.fit().unwrap();
        let m = ArrayD::<f64>::zeros(ndarray::IxDyn(&[1, 1]));
        let v = ArrayD::<f64>::zeros(ndarray::IxDyn(&[1]));
        let h = ArrayD::<f64>::zeros(ndarray::IxDyn(&[1, 3]));
        assert!(model.refine_dyn(&m, &v, &v, &h).is_err());
        assert!(model.refine_dyn(&v, &v, &v, &h).is_ok());
    }

    #[test]
    fn smoothed_tac_enters_only_the_dvr_design() {
        let t = array![0.5, 1.5, 2.5, 3.5, 4.5, 5.5];
        let tac = array![0.2, 0.9, 1.4, 1.6, 1.5, 1.3];
        let ref_tac = array![1.0, 1.6, 1.5, 1.2, 1.0, 0.8];
        // TAC delayed by one frame, so not proportional to the raw curve
        let smooth = array![0.1, 0.2, 0.9, 1.4, 1.6, 1.5];

        let grid = TimeGrid::minutes(t.clone(), Array1::ones(6)).unwrap();
        let data = KineticData::builder(grid, tac.clone(), ref_tac.clone())
            .weighting(Weighting::None)
            .build()
            .unwrap();
        let mut model = SrtmZhou2003::new(data);
        model.fit().unwrap();
        let plain_dvr = model.results().value(ZhouResult::Dvr, 0);
        let plain_r1 = model.results().value(ZhouResult::R1, 0);
        model.fit_with_smoothed(Some(smooth.clone().into())).unwrap();

        // Normal equations assembled by hand: y = ∫C, x = (∫Cr, Cr, −C_smooth)
        let flat = StartActivity::Flat;
        let int_tac = integrate(tac.view(), t.view(), flat).unwrap();
        let int_ref = integrate(ref_tac.view(), t.view(), flat).unwrap();
        let w = 1.0 / 6.0;
        let mut lhs = Matrix3::<f64>::zeros();
        let mut rhs = Vector3::<f64>::zeros();
        for i in 0..6 {
            let x = Vector3::new(int_ref[i], ref_tac[i], -smooth[i]);
            lhs += w * x * x.transpose();
            rhs += w * int_tac[i] * x;
        }
        let beta = lhs.lu().solve(&rhs).unwrap();
        let rss: f64 = (0..6)
            .map(|i| {
                let fitted = beta[0] * int_ref[i] + beta[1] * ref_tac[i] - beta[2] * smooth[i];
                w * (int_tac[i] - fitted).powi(2)
            })
            .sum();

        let res = model.results();
        assert_relative_eq!(res.value(ZhouResult::Dvr, 0), beta[0], max_relative = 1e-8);
        assert_relative_eq!(res.value(ZhouResult::NoiseVarEqDvr, 0), rss / 3.0, max_relative = 1e-6);
        assert!((res.value(ZhouResult::Dvr, 0) - plain_dvr).abs() > 1e-6);
        // The R1 equation still regresses the raw TAC
        assert_relative_eq!(res.value(ZhouResult::R1, 0), plain_r1, epsilon = 1e-12);
    }

    #[test]
    fn unusable_weights_degrade_only_their_row() {
        let grid = TimeGrid::minutes(array![0.5, 1.5, 2.5, 3.5], array![1.0, 1.0, 1.0, 1.0]).unwrap();
        let tac = array![[0.0, 0.5, 0.8, 0.9], [0.2, 0.5, 0.8, 0.9]];
        let data = KineticData::builder(grid, tac, array![1.0, 1.2, 1.0, 0.9])
            .weighting(Weighting::FrameDurationActivity)
            .build()
            .unwrap();
        let mut model = SrtmZhou2003::new(data);
        model.fit().unwrap();
        for &name in <ZhouResult as crate::model::ResultName>::ALL {
            assert_eq!(model.results().value(name, 0), 0.0, "{:?}", name);
        }
        assert!(model.results().value(ZhouResult::R1, 1) != 0.0);
        assert_eq!(model.diagnostics().singular_dvr, vec![0]);
        assert_eq!(model.diagnostics().singular_r1, vec![0]);
    }
}
