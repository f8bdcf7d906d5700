pub mod base;
pub mod build;
pub mod config;
pub mod container;
pub mod deno;
pub mod deploy;
pub mod env_file;
pub mod error;
pub mod executor;
pub mod git_diff;
pub mod install;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod secret;
pub mod tree;

pub use error::{Result, ShipyardError};
pub use executor::{EngineExecutor, Executor, RecordingExecutor};
pub use pipeline::Pipeline;
pub use secret::Secret;
pub use tree::SourceTree;
