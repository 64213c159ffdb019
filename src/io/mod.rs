//! Tabular input; result output lives on [`crate::model::Results::write_csv`]

mod frames;

pub use frames::FrameTable;
