pub mod args;
pub mod context;
pub mod plan;
pub mod result;

pub use args::*;
pub use context::*;
pub use plan::*;
pub use result::*;
