pub mod outcome;
pub mod service;

pub use outcome::*;
pub use service::*;
