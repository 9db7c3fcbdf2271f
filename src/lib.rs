pub mod cli;
pub mod collect;
pub mod config;
pub mod convert;
pub mod error;
pub mod expr;
pub mod filter;
pub mod formatters;
pub mod formula;
pub mod integrate;
pub mod pipeline;
pub mod schema;
pub mod writer;

pub use cli::{Cli, Commands};
pub use error::ConfigError;
pub use pipeline::{Pipeline, PipelineReport};
