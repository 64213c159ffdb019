//! Fit configuration loadable from JSON
//!
//! ```json
//! {
//!   "model": "SRTM_Gunn1997",
//!   "start_activity": "flat",
//!   "weighting": { "frame_duration_activity_decay": { "halflife": { "value": 20.334, "unit": "minutes" } } },
//!   "profile": { "xatol": 0.01 }
//! }
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KineticModelError;
use crate::integrate::StartActivity;
use crate::model::{KineticData, KineticDataBuilder, KineticModel, Weighting};
use crate::optimize::BasinHoppingOptions;
use crate::srtm::{ModelKind, ProfileOptions, SrtmGunn1997, SrtmLammertsma1996, SrtmZhou2003};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub model: ModelKind,
    pub start_activity: StartActivity,
    pub weighting: Weighting,
    /// Used by [`SrtmLammertsma1996`]
    pub basin_hopping: BasinHoppingOptions,
    /// Used by [`SrtmGunn1997`]
    pub profile: ProfileOptions,
}

impl FitSettings {
    pub fn from_json_str(json: &str) -> Result<Self, KineticModelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KineticModelError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String, KineticModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_start_activity(mut self, start_activity: StartActivity) -> Self {
        self.start_activity = start_activity;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_basin_hopping(mut self, options: BasinHoppingOptions) -> Self {
        self.basin_hopping = options;
        self
    }

    pub fn with_profile(mut self, options: ProfileOptions) -> Self {
        self.profile = options;
        self
    }

    /// Copy the data-level settings onto a builder
    pub fn configure(&self, builder: KineticDataBuilder) -> KineticDataBuilder {
        builder
            .start_activity(self.start_activity)
            .weighting(self.weighting.clone())
    }

    /// Wrap `data` in the configured estimator and fit it
    pub fn fit(&self, data: KineticData) -> Result<FittedModel, KineticModelError> {
        tracing::debug!("fitting {} rows with {}", data.n_rows(), self.model);
        Ok(match self.model {
            ModelKind::Zhou2003 => {
                let mut model = SrtmZhou2003::new(data);
                model.fit()?;
                FittedModel::Zhou2003(model)
            }
            ModelKind::Lammertsma1996 => {
                let mut model =
                    SrtmLammertsma1996::new(data).with_options(self.basin_hopping.clone());
                model.fit()?;
                FittedModel::Lammertsma1996(model)
            }
            ModelKind::Gunn1997 => {
                let mut model = SrtmGunn1997::new(data).with_options(self.profile.clone());
                model.fit()?;
                FittedModel::Gunn1997(model)
            }
        })
    }
}

/// A fitted estimator chosen at runtime
#[derive(Debug, Clone)]
pub enum FittedModel {
    Zhou2003(SrtmZhou2003),
    Lammertsma1996(SrtmLammertsma1996),
    Gunn1997(SrtmGunn1997),
}

impl FittedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            FittedModel::Zhou2003(_) => ModelKind::Zhou2003,
            FittedModel::Lammertsma1996(_) => ModelKind::Lammertsma1996,
            FittedModel::Gunn1997(_) => ModelKind::Gunn1997,
        }
    }

    /// Result column by its label, e.g. `"BP"`
    pub fn result(&self, label: &str) -> Option<ndarray::ArrayView1<'_, f64>> {
        match self {
            FittedModel::Zhou2003(m) => m.results().by_name(label),
            FittedModel::Lammertsma1996(m) => m.results().by_name(label),
            FittedModel::Gunn1997(m) => m.results().by_name(label),
        }
    }

    pub fn result_names(&self) -> Vec<&'static str> {
        match self {
            FittedModel::Zhou2003(m) => m.results().names().collect(),
            FittedModel::Lammertsma1996(m) => m.results().names().collect(),
            FittedModel::Gunn1997(m) => m.results().names().collect(),
        }
    }

    pub fn save_results(&self, path: impl AsRef<Path>) -> Result<(), KineticModelError> {
        match self {
            FittedModel::Zhou2003(m) => m.save_results(path),
            FittedModel::Lammertsma1996(m) => m.save_results(path),
            FittedModel::Gunn1997(m) => m.save_results(path),
        }
    }
}
