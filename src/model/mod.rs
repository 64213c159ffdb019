//! The kinetic model contract
//!
//! [`KineticData`] carries the validated inputs shared by every estimator;
//! each estimator pairs it with a [`Results`] store sized for its own
//! [`ResultName`] enumeration and implements [`KineticModel::fit`].

pub mod data;
pub mod results;
pub mod weights;
pub mod wls;

use std::path::Path;

pub use data::{KineticData, KineticDataBuilder};
pub use results::{ResultName, Results};
pub use weights::Weighting;

use crate::error::KineticModelError;

/// A reference tissue kinetic model
pub trait KineticModel: Sized {
    /// Result names this model declares
    type Output: ResultName;

    /// Wrap validated data; all results start as NaN
    fn new(data: KineticData) -> Self;

    fn data(&self) -> &KineticData;

    fn results(&self) -> &Results<Self::Output>;

    /// Fit every TAC row, writing into the results store
    fn fit(&mut self) -> Result<&mut Self, KineticModelError>;

    /// Write the results to a CSV file, one line per TAC row
    fn save_results(&self, path: impl AsRef<Path>) -> Result<(), KineticModelError> {
        self.results().save_csv(path, self.data().row_names())
    }
}
