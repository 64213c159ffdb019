pub mod basinhopping;

pub use basinhopping::{BasinHopping, BasinHoppingOptions, BasinHoppingResult};
