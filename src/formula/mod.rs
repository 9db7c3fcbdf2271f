//! Formula fields: plain arithmetic with `[variable]` placeholders, or a
//! piecewise table keyed on one variable.

pub mod expression;
pub mod resolver;

pub use expression::*;
pub use resolver::*;
