use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

use crate::error::KineticModelError;

/// Time activity curve input accepted by the model constructors
///
/// A single curve is promoted to a one-row matrix. Dynamic-dimensional
/// arrays are accepted if they are 1- or 2-dimensional.
#[derive(Debug, Clone)]
pub enum TacInput {
    Single(Array1<f64>),
    Rows(Array2<f64>),
    Dyn(ArrayD<f64>),
}

impl TacInput {
    /// Resolve the input into a `rows × frames` matrix
    pub(crate) fn into_rows(self, what: &str) -> Result<Array2<f64>, KineticModelError> {
        match self {
            TacInput::Single(curve) => {
                let n = curve.len();
                Ok(curve.into_shape_with_order((1, n)).map_err(|e| {
                    KineticModelError::invalid(format!("{} could not be reshaped: {}", what, e))
                })?)
            }
            TacInput::Rows(rows) => Ok(rows),
            TacInput::Dyn(array) => match array.ndim() {
                1 => {
                    let curve = array.into_dimensionality::<Ix1>().map_err(|e| {
                        KineticModelError::invalid(format!("{}: {}", what, e))
                    })?;
                    TacInput::Single(curve).into_rows(what)
                }
                2 => array
                    .into_dimensionality::<Ix2>()
                    .map_err(|e| KineticModelError::invalid(format!("{}: {}", what, e))),
                n => Err(KineticModelError::invalid(format!(
                    "{} must be 1- or 2-dimensional, got {} dimensions",
                    what, n
                ))),
            },
        }
    }

    /// Whether the input was given as a single curve
    pub(crate) fn is_single(&self) -> bool {
        match self {
            TacInput::Single(_) => true,
            TacInput::Rows(_) => false,
            TacInput::Dyn(array) => array.ndim() == 1,
        }
    }
}

impl From<Array1<f64>> for TacInput {
    fn from(curve: Array1<f64>) -> Self {
        TacInput::Single(curve)
    }
}

impl From<Array2<f64>> for TacInput {
    fn from(rows: Array2<f64>) -> Self {
        TacInput::Rows(rows)
    }
}

impl From<ArrayD<f64>> for TacInput {
    fn from(array: ArrayD<f64>) -> Self {
        TacInput::Dyn(array)
    }
}

impl From<Vec<f64>> for TacInput {
    fn from(curve: Vec<f64>) -> Self {
        TacInput::Single(Array1::from(curve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn single_curve_becomes_one_row() {
        let rows = TacInput::from(array![1.0, 2.0, 3.0]).into_rows("TAC").unwrap();
        assert_eq!(rows.dim(), (1, 3));
    }

    #[test]
    fn rejects_three_dimensional_input() {
        let cube = ArrayD::<f64>::zeros(IxDyn(&[2, 2, 3]));
        let err = TacInput::from(cube).into_rows("TAC").unwrap_err();
        assert!(matches!(err, KineticModelError::InvalidInput(_)));
    }

    #[test]
    fn accepts_dynamic_matrix() {
        let m = ArrayD::<f64>::zeros(IxDyn(&[4, 3]));
        assert_eq!(TacInput::from(m).into_rows("TAC").unwrap().dim(), (4, 3));
    }
}
