pub mod paths;
pub mod since;

pub use paths::*;
pub use since::*;
