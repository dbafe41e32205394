pub mod catalog;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod record;

pub use catalog::*;
pub use error::*;
pub use identity::*;
pub use outcome::*;
pub use record::*;
