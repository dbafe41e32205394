pub mod executor;
pub mod planner;
pub mod unique;

pub use executor::*;
pub use planner::*;
pub use unique::*;
