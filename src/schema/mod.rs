pub mod entities;
pub mod tables;
pub mod types;

pub use entities::*;
pub use tables::*;
pub use types::*;
