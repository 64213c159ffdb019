use std::io::Read;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::data::{TimeGrid, TimeUnit};
use crate::error::KineticModelError;

/// A delimited table with one line per frame
///
/// The first two columns hold the frame start and end times; every further
/// column is a time activity curve named by its header, e.g.
///
/// ```text
/// start   end     Neocortex   Total_cb
/// 0       15      0.12        0.20
/// 15      30      1.85        2.31
/// ```
#[derive(Debug, Clone)]
pub struct FrameTable {
    headers: Vec<String>,
    columns: Vec<Array1<f64>>,
}

impl FrameTable {
    pub fn from_path(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, KineticModelError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, delimiter)
    }

    /// Parse a table from any reader; lines starting with `#` are skipped
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, KineticModelError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.len() < 2 {
            return Err(KineticModelError::invalid(format!(
                "frame table needs start and end columns, found {} column(s)",
                headers.len()
            )));
        }

        let mut values: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            for (col, field) in record.iter().enumerate() {
                let v = field.parse::<f64>().map_err(|_| {
                    KineticModelError::invalid(format!(
                        "frame {} column '{}': '{}' is not a number",
                        line, headers[col], field
                    ))
                })?;
                values[col].push(v);
            }
        }

        tracing::debug!(
            "read frame table with {} frames and {} columns",
            values[0].len(),
            headers.len()
        );

        Ok(Self {
            headers,
            columns: values.into_iter().map(Array1::from_vec).collect(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Names of the TAC columns (everything after start and end)
    pub fn curve_names(&self) -> &[String] {
        &self.headers[2..]
    }

    pub fn n_frames(&self) -> usize {
        self.columns[0].len()
    }

    /// Time grid from the start and end columns, converted from `unit`
    pub fn time_grid(&self, unit: TimeUnit) -> Result<TimeGrid, KineticModelError> {
        let start = self.columns[0].to_vec();
        let end = self.columns[1].to_vec();
        TimeGrid::from_frame_bounds(&start, &end, unit)
    }

    pub fn column(&self, name: &str) -> Result<Array1<f64>, KineticModelError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].clone())
            .ok_or_else(|| {
                KineticModelError::invalid(format!("frame table has no column '{}'", name))
            })
    }

    /// Stack several columns as rows of a `curves × frames` matrix
    pub fn curves(&self, names: &[&str]) -> Result<Array2<f64>, KineticModelError> {
        let mut out = Array2::zeros((names.len(), self.n_frames()));
        for (row, name) in names.iter().enumerate() {
            out.row_mut(row).assign(&self.column(name)?);
        }
        Ok(out)
    }
}
