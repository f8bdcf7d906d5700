pub mod config;
pub mod deno;
pub mod firebase;
pub mod git;

use crate::output::{print_json, print_table};
use anyhow::Context as _;
use serde::Serialize;
use shipyard_core::config::Config;
use shipyard_core::container::Container;
use shipyard_core::executor::{EngineExecutor, Executor, RecordingExecutor, RunOutput};
use shipyard_core::{Secret, SourceTree};
use std::path::{Path, PathBuf};

/// Directories never staged into a container from the host.
const HOST_EXCLUDES: &[&str] = &["node_modules", ".git"];
/// Same as [`HOST_EXCLUDES`] but keeping `.git` for commands that need history.
const HOST_EXCLUDES_WITH_GIT: &[&str] = &["node_modules"];

/// Everything a subcommand needs besides its own arguments.
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub json: bool,
    pub dry_run: bool,
    engine: String,
}

impl Context {
    pub fn load(
        root: PathBuf,
        config_path: Option<&Path>,
        json: bool,
        dry_run: bool,
        engine: Option<String>,
    ) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path),
            None => Config::load(&root),
        }
        .context("failed to load config")?;
        let engine = engine.unwrap_or_else(|| config.engine.clone());
        Ok(Self {
            root,
            config,
            json,
            dry_run,
            engine,
        })
    }

    pub fn runner(&self) -> anyhow::Result<Runner> {
        if self.dry_run {
            return Ok(Runner::DryRun(RecordingExecutor::new()));
        }
        let engine = EngineExecutor::new(&self.engine)
            .with_context(|| format!("cannot run containers with '{}'", self.engine))?;
        Ok(Runner::Engine(engine))
    }

    /// Snapshot the project root from disk.
    pub fn source_tree(&self, with_git: bool) -> anyhow::Result<SourceTree> {
        let excludes = if with_git {
            HOST_EXCLUDES_WITH_GIT
        } else {
            HOST_EXCLUDES
        };
        SourceTree::from_dir(&self.root, excludes)
            .with_context(|| format!("failed to read project at {}", self.root.display()))
    }
}

/// Parse an optional `env:NAME` / `file:PATH` flag into a [`Secret`].
pub fn secret_arg(name: &str, reference: Option<&str>) -> anyhow::Result<Option<Secret>> {
    reference
        .map(|r| Secret::parse(name, r).with_context(|| format!("invalid --{name}")))
        .transpose()
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// The executor a command runs with: a real engine, or a recorder for
/// `--dry-run`.
pub enum Runner {
    Engine(EngineExecutor),
    DryRun(RecordingExecutor),
}

impl Executor for Runner {
    fn run(&self, container: &Container, export: Option<&str>) -> shipyard_core::Result<RunOutput> {
        match self {
            Runner::Engine(e) => e.run(container, export),
            Runner::DryRun(r) => r.run(container, export),
        }
    }
}

#[derive(Serialize)]
struct PlannedRun {
    image: String,
    export: Option<String>,
    directives: Vec<String>,
}

impl Runner {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Runner::DryRun(_))
    }

    /// Print what a dry run would have executed. No-op for a real engine.
    pub fn report(&self, json: bool) -> anyhow::Result<()> {
        let Runner::DryRun(recorder) = self else {
            return Ok(());
        };
        let plan: Vec<PlannedRun> = recorder
            .runs()
            .into_iter()
            .map(|run| PlannedRun {
                image: run.container.image().to_string(),
                export: run.export,
                directives: run
                    .container
                    .directives()
                    .iter()
                    .map(|d| d.describe())
                    .collect(),
            })
            .collect();

        if json {
            return print_json(&serde_json::json!({ "dry_run": true, "runs": plan }));
        }
        for (i, run) in plan.iter().enumerate() {
            println!(
                "# run {} ({}{})",
                i + 1,
                run.image,
                run.export
                    .as_deref()
                    .map(|p| format!(", export {p}"))
                    .unwrap_or_default()
            );
            let rows = run
                .directives
                .iter()
                .enumerate()
                .map(|(n, d)| vec![(n + 1).to_string(), d.clone()])
                .collect();
            print_table(&["STEP", "DIRECTIVE"], rows);
            println!();
        }
        Ok(())
    }
}
