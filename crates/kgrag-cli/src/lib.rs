//! Orchestration for the `kgrag` binary: flags, model construction and the
//! load → connect → index → query run.

pub mod cli;
pub mod models;
pub mod pipeline;

pub use cli::Cli;
pub use models::bedrock_models;
pub use pipeline::{Pipeline, RunReport, RunStatus, DEFAULT_QUESTIONS};
