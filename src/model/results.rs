use std::{fmt::Debug, marker::PhantomData, path::Path};

use csv::WriterBuilder;
use ndarray::{Array2, ArrayView1};

use crate::error::KineticModelError;

/// Enumeration of the result names produced by an estimator
///
/// The declaration order of [`ResultName::ALL`] is the column order of the
/// results store and of the CSV output.
pub trait ResultName: Copy + Debug + Send + Sync + 'static {
    /// Every result name, in column order
    const ALL: &'static [Self];

    /// Column label
    fn name(self) -> &'static str;

    /// Column index; must agree with the position in [`ResultName::ALL`]
    fn index(self) -> usize;
}

/// Fixed-shape results store: one column per result name, one row per TAC
///
/// Created filled with NaN. Estimators write values in place; the shape
/// never changes after construction.
#[derive(Debug, Clone)]
pub struct Results<K: ResultName> {
    values: Array2<f64>,
    _names: PhantomData<K>,
}

impl<K: ResultName> Results<K> {
    pub fn new(rows: usize) -> Self {
        Self {
            values: Array2::from_elem((rows, K::ALL.len()), f64::NAN),
            _names: PhantomData,
        }
    }

    /// Per-row values of one result
    pub fn get(&self, name: K) -> ArrayView1<'_, f64> {
        self.values.column(name.index())
    }

    /// Value of one result for one row
    pub fn value(&self, name: K, row: usize) -> f64 {
        self.values[[row, name.index()]]
    }

    pub(crate) fn set(&mut self, name: K, row: usize, value: f64) {
        self.values[[row, name.index()]] = value;
    }

    /// Look a result up by its column label
    pub fn by_name(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        K::ALL
            .iter()
            .find(|k| k.name() == label)
            .map(|&k| self.get(k))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        K::ALL.iter().map(|k| k.name())
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// The whole store as a `rows × results` matrix
    pub fn as_matrix(&self) -> &Array2<f64> {
        &self.values
    }

    /// Write the results as CSV
    ///
    /// The header holds an empty cell followed by the result names; each line
    /// starts with the row label (or the row index when `row_names` is `None`).
    pub fn write_csv<W: std::io::Write>(
        &self,
        writer: W,
        row_names: Option<&[String]>,
    ) -> Result<(), KineticModelError> {
        self.check_row_names(row_names)?;
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);

        let mut header = vec![String::new()];
        header.extend(self.names().map(str::to_string));
        writer.write_record(&header)?;

        for (i, row) in self.values.rows().into_iter().enumerate() {
            let label = match row_names {
                Some(names) => names[i].clone(),
                None => i.to_string(),
            };
            let mut record = vec![label];
            record.extend(row.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_csv(
        &self,
        path: impl AsRef<Path>,
        row_names: Option<&[String]>,
    ) -> Result<(), KineticModelError> {
        self.check_row_names(row_names)?;
        let file = std::fs::File::create(path)?;
        self.write_csv(file, row_names)
    }

    fn check_row_names(&self, row_names: Option<&[String]>) -> Result<(), KineticModelError> {
        match row_names {
            Some(names) if names.len() != self.values.nrows() => {
                Err(KineticModelError::invalid(format!(
                    "expected {} row names, got {}",
                    self.values.nrows(),
                    names.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Declare a result-name enumeration together with its [`ResultName`] impl
macro_rules! result_names {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::model::results::ResultName for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            fn index(self) -> usize {
                self as usize
            }
        }
    };
}

pub(crate) use result_names;

#[cfg(test)]
mod tests {
    use super::*;

    result_names! {
        enum Demo {
            Alpha => "alpha",
            Beta => "beta",
        }
    }

    #[test]
    fn starts_as_nan_and_keeps_shape() {
        let mut results = Results::<Demo>::new(3);
        assert!(results.get(Demo::Alpha).iter().all(|v| v.is_nan()));
        results.set(Demo::Beta, 2, 4.5);
        assert_eq!(results.value(Demo::Beta, 2), 4.5);
        assert_eq!(results.as_matrix().dim(), (3, 2));
        assert_eq!(results.by_name("beta").unwrap()[2], 4.5);
        assert!(results.by_name("gamma").is_none());
    }

    #[test]
    fn csv_layout() {
        let mut results = Results::<Demo>::new(2);
        for row in 0..2 {
            results.set(Demo::Alpha, row, row as f64);
            results.set(Demo::Beta, row, 0.5);
        }
        let names = vec!["caudate".to_string(), "putamen".to_string()];
        let mut buf = Vec::new();
        results.write_csv(&mut buf, Some(&names)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, ",alpha,beta\ncaudate,0,0.5\nputamen,1,0.5\n");

        let mut buf = Vec::new();
        results.write_csv(&mut buf, None).unwrap();
        assert!(String::from_utf8(buf).unwrap().starts_with(",alpha,beta\n0,0,0.5"));
    }

    #[test]
    fn csv_rejects_short_row_names() {
        let results = Results::<Demo>::new(2);
        let names = vec!["caudate".to_string()];
        let mut buf = Vec::new();
        let err = results.write_csv(&mut buf, Some(&names)).unwrap_err();
        assert!(matches!(err, KineticModelError::InvalidInput(_)));
        assert!(buf.is_empty());
    }
}
