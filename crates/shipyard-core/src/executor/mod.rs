//! Executors turn a [`Container`] description into running processes.
//!
//! - [`EngineExecutor`] drives a docker/podman compatible CLI.
//! - [`RecordingExecutor`] simulates execution in memory and records every
//!   command. It backs `--dry-run` and the pipeline tests.

mod engine;
mod recording;

pub use engine::EngineExecutor;
pub use recording::{RecordedExec, RecordedRun, RecordingExecutor, Response};

use crate::container::Container;
use crate::error::{Result, ShipyardError};
use crate::tree::SourceTree;

/// Captured result of running a container.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Stdout of the last exec.
    pub stdout: String,
    /// Stderr of the last exec.
    pub stderr: String,
    /// Filesystem at the requested export path, if one was requested.
    pub tree: Option<SourceTree>,
}

impl RunOutput {
    pub fn into_tree(self) -> Result<SourceTree> {
        self.tree
            .ok_or_else(|| ShipyardError::Engine("run did not export a directory".into()))
    }
}

pub trait Executor: Send + Sync {
    /// Apply every directive of `container` in order. A non-zero exec aborts
    /// the run with `CommandFailed`. When `export` is set, the filesystem
    /// below that absolute path is returned in [`RunOutput::tree`].
    fn run(&self, container: &Container, export: Option<&str>) -> Result<RunOutput>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn run(&self, container: &Container, export: Option<&str>) -> Result<RunOutput> {
        (**self).run(container, export)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn run(&self, container: &Container, export: Option<&str>) -> Result<RunOutput> {
        (**self).run(container, export)
    }
}
