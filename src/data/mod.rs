pub mod tac;
pub mod time_grid;
pub mod units;

pub use tac::TacInput;
pub use time_grid::TimeGrid;
pub use units::{TimeQuantity, TimeUnit};
