//! Reference tissue kinetic models for dynamic PET
//!
//! Time activity curves (TACs) of target regions or voxels are fitted against
//! a reference region TAC with one of three simplified reference tissue model
//! (SRTM) estimators:
//!
//! ```rust
//! use kineticmodel::prelude::*;
//! use ndarray::array;
//!
//! let time = TimeGrid::minutes(array![0.5, 1.5, 2.5], array![1.0, 1.0, 1.0])?;
//! let data = KineticData::builder(time, array![0.0, 0.5, 0.8], array![1.0, 1.2, 1.0])
//!     .weighting(Weighting::None)
//!     .build()?;
//!
//! let mut model = SrtmZhou2003::new(data);
//! model.fit()?;
//! let bp = model.results().get(ZhouResult::Bp);
//! assert!(bp[0].is_finite());
//! # Ok::<(), kineticmodel::KineticModelError>(())
//! ```

pub mod data;
pub mod error;
pub mod integrate;
pub mod io;
pub mod model;
pub mod optimize;
pub mod settings;
pub mod srtm;
pub mod voxelwise;

pub use crate::data::{TacInput, TimeGrid, TimeQuantity, TimeUnit};
pub use crate::integrate::{integrate, integrate_dyn, StartActivity};
pub use crate::model::{KineticData, KineticModel, ResultName, Results, Weighting};
pub use crate::srtm::{
    srtm_tac, ModelKind, SrtmGunn1997, SrtmLammertsma1996, SrtmZhou2003,
};
pub use error::KineticModelError;

pub mod prelude {
    pub mod data {
        pub use crate::data::{TacInput, TimeGrid, TimeQuantity, TimeUnit};
        pub use crate::io::FrameTable;
        pub use crate::model::{KineticData, KineticDataBuilder, Weighting};
    }
    pub mod models {
        pub use crate::srtm::{
            srtm_tac, FitDiagnostics, GunnResult, LammertsmaResult, ModelKind, ProfileOptions,
            SrtmGunn1997, SrtmLammertsma1996, SrtmZhou2003, ZhouResult,
        };
    }
    pub mod voxelwise {
        pub use crate::voxelwise::{
            fit_voxels, fit_voxels_lrsc, reference_from_mask, IdentityFilter, ParametricMaps,
            SpatialFilter, VoxelSeries,
        };
    }

    pub use self::data::*;
    pub use self::models::*;
    pub use crate::error::KineticModelError;
    pub use crate::integrate::{integrate, StartActivity};
    pub use crate::model::{KineticModel, ResultName, Results};
    pub use crate::optimize::BasinHoppingOptions;
    pub use crate::settings::{FitSettings, FittedModel};
}
