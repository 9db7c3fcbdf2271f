pub mod builtin;
pub mod registry;

pub use builtin::*;
pub use registry::*;
