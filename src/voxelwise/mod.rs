//! Fitting every voxel of a dynamic image
//!
//! A dynamic image is handled as a [`VoxelSeries`]: the spatial axes are
//! flattened in standard (row-major) order and the last axis holds the
//! frames. Voxels whose curve is not finite everywhere, or never reaches 1,
//! are left out of the fit and receive NaN in every [`ParametricMaps`] entry.
//!
//! Voxels whose frame weights cannot be derived (a zero frame under activity
//! weighting) are masked out the same way.
//!
//! Spatial smoothing is supplied by the caller through [`SpatialFilter`].

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Axis, IxDyn};

use crate::data::TimeGrid;
use crate::error::KineticModelError;
use crate::model::{KineticData, KineticModel, ResultName};
use crate::settings::FitSettings;
use crate::srtm::{SrtmZhou2003, ZhouResult};

/// Minimum peak value for a voxel to be fitted
const MIN_PEAK: f64 = 1.0;

/// Number of R1-equation coefficients that get a smoothness penalty
const M: usize = 3;

/// Smooths one volume
///
/// `volume` has the spatial shape of the image. The result must have the
/// same shape.
pub trait SpatialFilter: Sync {
    fn smooth(&self, volume: ArrayViewD<f64>) -> ArrayD<f64>;
}

/// Leaves volumes unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl SpatialFilter for IdentityFilter {
    fn smooth(&self, volume: ArrayViewD<f64>) -> ArrayD<f64> {
        volume.to_owned()
    }
}

/// Time series of every voxel, `voxels × frames`
#[derive(Debug, Clone)]
pub struct VoxelSeries {
    values: Array2<f64>,
    spatial_shape: Vec<usize>,
}

impl VoxelSeries {
    /// Voxels already flattened; maps will be 1-D
    pub fn new(values: Array2<f64>) -> Self {
        let spatial_shape = vec![values.nrows()];
        Self {
            values,
            spatial_shape,
        }
    }

    /// From an image whose last axis is time
    pub fn from_image(image: ArrayD<f64>) -> Result<Self, KineticModelError> {
        let shape = image.shape().to_vec();
        let Some((&frames, spatial)) = shape.split_last() else {
            return Err(KineticModelError::invalid("image must have a time axis"));
        };
        if spatial.is_empty() {
            return Err(KineticModelError::invalid(
                "image must have at least one spatial axis",
            ));
        }
        let voxels: usize = spatial.iter().product();
        let values = image
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((voxels, frames))
            .map_err(|e| KineticModelError::invalid(e.to_string()))?;
        Ok(Self {
            values,
            spatial_shape: spatial.to_vec(),
        })
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn spatial_shape(&self) -> &[usize] {
        &self.spatial_shape
    }

    pub fn n_voxels(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_frames(&self) -> usize {
        self.values.ncols()
    }

    /// Voxels that will be fitted: finite everywhere and peak ≥ 1
    pub fn mask(&self) -> Array1<bool> {
        self.values
            .axis_iter(Axis(0))
            .map(|tac| {
                tac.iter().all(|v| v.is_finite())
                    && tac.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)) >= MIN_PEAK
            })
            .collect()
    }

    fn select(&self, mask: &Array1<bool>) -> Array2<f64> {
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.values.select(Axis(0), &rows)
    }

    /// One frame as a flattened volume with non-finite voxels set to 0
    fn frame(&self, index: usize) -> Array1<f64> {
        self.values
            .column(index)
            .mapv(|v| if v.is_finite() { v } else { 0.0 })
    }
}

/// Mean time activity curve of the voxels selected by `mask`
pub fn reference_from_mask(
    series: &VoxelSeries,
    mask: ArrayView1<bool>,
) -> Result<Array1<f64>, KineticModelError> {
    if mask.len() != series.n_voxels() {
        return Err(KineticModelError::invalid(format!(
            "reference mask must have one entry per voxel ({} != {})",
            mask.len(),
            series.n_voxels()
        )));
    }
    let selected: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect();
    series
        .values
        .select(Axis(0), &selected)
        .mean_axis(Axis(0))
        .ok_or_else(|| KineticModelError::invalid("reference mask selects no voxels"))
}

/// Result maps keyed by result name
#[derive(Debug, Clone)]
pub struct ParametricMaps {
    names: Vec<&'static str>,
    maps: Vec<ArrayD<f64>>,
    mask: Array1<bool>,
}

impl ParametricMaps {
    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| &self.maps[i])
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Voxels that were fitted
    pub fn mask(&self) -> &Array1<bool> {
        &self.mask
    }

    fn scatter(
        series: &VoxelSeries,
        mask: Array1<bool>,
        columns: Vec<(&'static str, ArrayView1<f64>)>,
    ) -> Result<Self, KineticModelError> {
        let mut names = Vec::with_capacity(columns.len());
        let mut maps = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            let flat = scatter(&mask, values, f64::NAN);
            let map = flat
                .into_shape_with_order(IxDyn(series.spatial_shape()))
                .map_err(|e| KineticModelError::invalid(e.to_string()))?;
            names.push(name);
            maps.push(map);
        }
        Ok(Self { names, maps, mask })
    }
}

/// Place `values` at the masked-in positions, `fill` elsewhere
fn scatter(mask: &Array1<bool>, values: ArrayView1<f64>, fill: f64) -> Array1<f64> {
    let mut out = Array1::from_elem(mask.len(), fill);
    let slots = mask.iter().enumerate().filter(|(_, keep)| **keep).map(|(i, _)| i);
    for (slot, &v) in slots.zip(values.iter()) {
        out[slot] = v;
    }
    out
}

fn gather(mask: &Array1<bool>, volume: &Array1<f64>) -> Array1<f64> {
    mask.iter()
        .zip(volume.iter())
        .filter(|(keep, _)| **keep)
        .map(|(_, &v)| v)
        .collect()
}

/// Build model inputs from the masked-in voxels
///
/// Voxels whose weights turn out unusable are removed from `mask` and the
/// inputs are rebuilt without them.
fn build_data(
    series: &VoxelSeries,
    mask: &mut Array1<bool>,
    time: &TimeGrid,
    ref_tac: &Array1<f64>,
    settings: &FitSettings,
) -> Result<KineticData, KineticModelError> {
    if series.n_frames() != time.len() {
        return Err(KineticModelError::invalid(format!(
            "image must have one frame per time point ({} != {})",
            series.n_frames(),
            time.len()
        )));
    }
    loop {
        let tac = series.select(mask);
        if tac.nrows() == 0 {
            return Err(KineticModelError::invalid("no voxel passes the mask"));
        }
        let data = settings
            .configure(KineticData::builder(time.clone(), tac, ref_tac.clone()))
            .build()?;
        if data.unusable_weight_rows().is_empty() {
            tracing::debug!("fitting {} of {} voxels", data.n_rows(), series.n_voxels());
            return Ok(data);
        }

        let voxels: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        tracing::debug!(
            "masking out {} voxels with unusable weights",
            data.unusable_weight_rows().len()
        );
        for &row in data.unusable_weight_rows() {
            mask[voxels[row]] = false;
        }
    }
}

/// Fit the configured model to every masked-in voxel
pub fn fit_voxels(
    series: &VoxelSeries,
    time: &TimeGrid,
    ref_tac: &Array1<f64>,
    settings: &FitSettings,
) -> Result<ParametricMaps, KineticModelError> {
    let mut mask = series.mask();
    let data = build_data(series, &mut mask, time, ref_tac, settings)?;
    let fitted = settings.fit(data)?;

    let mut columns = Vec::new();
    for name in fitted.result_names() {
        if let Some(values) = fitted.result(name) {
            columns.push((name, values));
        }
    }
    ParametricMaps::scatter(series, mask, columns)
}

/// Linear regression with spatial constraint over the whole image
///
/// 1. Smooth every frame and fit [`SrtmZhou2003`] with the smoothed curves
///    in the DVR equation.
/// 2. Smooth the R1, k2 and k2a maps (unfitted voxels count as 0).
/// 3. Penalty `h = 3·noiseVar_eqR1 / (estimate − smoothed)²`, non-finite
///    values set to 0, then smoothed.
/// 4. [`SrtmZhou2003::refine`] towards the smoothed maps.
pub fn fit_voxels_lrsc<F: SpatialFilter>(
    series: &VoxelSeries,
    time: &TimeGrid,
    ref_tac: &Array1<f64>,
    settings: &FitSettings,
    filter: &F,
    show_progress: bool,
) -> Result<ParametricMaps, KineticModelError> {
    let mut mask = series.mask();
    let data = build_data(series, &mut mask, time, ref_tac, settings)?;
    let shape = series.spatial_shape();

    let progress = progress_bar(show_progress, (series.n_frames() + 2 * M + 2) as u64);
    let smooth = |volume: &Array1<f64>| -> Result<Array1<f64>, KineticModelError> {
        let volume = volume
            .view()
            .into_shape_with_order(IxDyn(shape))
            .map_err(|e| KineticModelError::invalid(e.to_string()))?;
        let out = filter.smooth(volume);
        progress.inc(1);
        if out.shape() != shape {
            return Err(KineticModelError::invalid(format!(
                "spatial filter returned shape {:?}, expected {:?}",
                out.shape(),
                shape
            )));
        }
        Ok(out.iter().copied().collect())
    };

    progress.set_message("smoothing frames");
    let mut smooth_tac = Array2::zeros((data.n_rows(), series.n_frames()));
    for frame in 0..series.n_frames() {
        let volume = smooth(&series.frame(frame))?;
        smooth_tac.column_mut(frame).assign(&gather(&mask, &volume));
    }

    progress.set_message("fitting");
    let mut model = SrtmZhou2003::new(data);
    model.fit_with_smoothed(Some(smooth_tac.into()))?;
    progress.inc(1);

    progress.set_message("smoothing estimates");
    let noise = model.results().get(ZhouResult::NoiseVarEqR1).to_owned();
    let mut priors = Vec::with_capacity(M);
    let mut h = Array2::zeros((model.data().n_rows(), M));
    for (k, name) in [ZhouResult::R1, ZhouResult::K2, ZhouResult::K2a]
        .into_iter()
        .enumerate()
    {
        let estimate = model.results().get(name).to_owned();
        let smoothed = gather(&mask, &smooth(&scatter(&mask, estimate.view(), 0.0))?);

        let mut penalty = Array1::zeros(estimate.len());
        ndarray::Zip::from(&mut penalty)
            .and(&noise)
            .and(&estimate)
            .and(&smoothed)
            .for_each(|p, &nv, &e, &s| {
                let v = M as f64 * nv / (e - s).powi(2);
                *p = if v.is_finite() { v } else { 0.0 };
            });
        let penalty = gather(&mask, &smooth(&scatter(&mask, penalty.view(), 0.0))?);
        h.column_mut(k).assign(&penalty);
        priors.push(smoothed);
    }

    progress.set_message("refining");
    model.refine(priors[0].view(), priors[1].view(), priors[2].view(), h.view())?;
    progress.inc(1);
    progress.finish_and_clear();

    let columns = ZhouResult::ALL
        .iter()
        .map(|&name| (name.name(), model.results().get(name)))
        .collect();
    ParametricMaps::scatter(series, mask, columns)
}

fn progress_bar(show: bool, len: u64) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mask_requires_finite_curve_reaching_one() {
        let series = VoxelSeries::new(array![
            [0.0, 2.0, 1.0],
            [0.1, 0.2, 0.9],
            [1.0, f64::NAN, 3.0],
            [1.0, 1.0, 1.0],
        ]);
        assert_eq!(series.mask().to_vec(), vec![true, false, false, true]);
    }

    #[test]
    fn reference_is_mean_of_selected_voxels() {
        let series = VoxelSeries::new(array![[1.0, 2.0], [3.0, 4.0], [100.0, 100.0]]);
        let r = reference_from_mask(&series, array![true, true, false].view()).unwrap();
        assert_eq!(r.to_vec(), vec![2.0, 3.0]);
        assert!(reference_from_mask(&series, array![false, false, false].view()).is_err());
        assert!(reference_from_mask(&series, array![true].view()).is_err());
    }

    #[test]
    fn image_axes_are_flattened_row_major() {
        let image = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |idx| {
            (idx[0] * 100 + idx[1] * 10 + idx[2]) as f64
        });
        let series = VoxelSeries::from_image(image).unwrap();
        assert_eq!(series.n_voxels(), 6);
        assert_eq!(series.n_frames(), 4);
        assert_eq!(series.values()[[4, 2]], 112.0);
        assert_eq!(series.spatial_shape(), &[2, 3]);
    }

    #[test]
    fn scatter_fills_unmasked() {
        let mask = array![true, false, true];
        let out = scatter(&mask, array![1.0, 2.0].view(), f64::NAN);
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(gather(&mask, &out).to_vec(), vec![1.0, 2.0]);
    }
}
