pub mod decision;
pub mod transaction;

pub use decision::*;
pub use transaction::*;
