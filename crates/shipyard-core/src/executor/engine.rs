//! Executor backed by a docker/podman compatible command-line engine.
//!
//! One long-lived container is started per run from the base image with a
//! `sleep` entrypoint. Trees and files are staged with `cp`, every exec runs
//! through `exec`, and the requested export path is copied back out before
//! the container is removed. Trees pass through a host directory on the way
//! in and out; `cp` keeps symlinks and permission bits in both directions.
//!
//! Secret environment values are handed to the engine CLI through its own
//! process environment (`-e NAME` without a value), so they never appear in
//! an argument list.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;
use uuid::Uuid;

use crate::container::{command_line, Container, Directive};
use crate::error::{Result, ShipyardError};
use crate::executor::{Executor, RunOutput};
use crate::secret::Secret;
use crate::tree::SourceTree;

const KEEPALIVE_SECONDS: &str = "86400";

#[derive(Debug, Clone)]
pub struct EngineExecutor {
    program: PathBuf,
}

enum EnvValue {
    Plain(String),
    Secret(Secret),
}

impl EngineExecutor {
    /// Locate `engine` (e.g. `docker`, `podman`) on PATH.
    pub fn new(engine: &str) -> Result<Self> {
        let program =
            which::which(engine).map_err(|_| ShipyardError::EngineNotFound(engine.to_string()))?;
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run an engine subcommand, failing with the engine's stderr.
    fn engine(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ShipyardError::Engine(format!("failed to spawn engine: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ShipyardError::Engine(format!(
                "`{} {}` failed: {}",
                self.program.display(),
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn copy_in(&self, id: &str, host: &Path, target: &str) -> Result<()> {
        self.engine(&["exec", id, "mkdir", "-p", target])?;
        let src = format!("{}/.", host.display());
        self.engine(&["cp", &src, &format!("{id}:{target}")])?;
        Ok(())
    }

    fn copy_file_in(&self, id: &str, host: &Path, target: &str) -> Result<()> {
        if let Some(parent) = Path::new(target).parent() {
            let parent = parent.to_string_lossy().into_owned();
            self.engine(&["exec", id, "mkdir", "-p", &parent])?;
        }
        let src = host.display().to_string();
        self.engine(&["cp", &src, &format!("{id}:{target}")])?;
        Ok(())
    }

    fn exec(
        &self,
        id: &str,
        workdir: &str,
        env: &[(String, EnvValue)],
        args: &[String],
    ) -> Result<Output> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("exec").arg("-w").arg(workdir);
        for (name, value) in env {
            match value {
                EnvValue::Plain(v) => {
                    cmd.arg("-e").arg(format!("{name}={v}"));
                }
                EnvValue::Secret(secret) => {
                    cmd.arg("-e").arg(name);
                    cmd.env(name, secret.plaintext()?);
                }
            }
        }
        cmd.arg(id).args(args);
        cmd.stdin(Stdio::null());

        tracing::info!(workdir, command = %command_line(args), "exec");
        cmd.output()
            .map_err(|e| ShipyardError::Engine(format!("failed to spawn engine: {e}")))
    }
}

/// Removes the container when the run ends, successfully or not.
struct ContainerGuard<'a> {
    engine: &'a EngineExecutor,
    id: String,
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.engine(&["rm", "-f", &self.id]) {
            tracing::warn!(container = %self.id, "failed to remove container: {e}");
        }
    }
}

impl Executor for EngineExecutor {
    fn run(&self, container: &Container, export: Option<&str>) -> Result<RunOutput> {
        let id = format!("shipyard-{}", Uuid::new_v4().simple());
        tracing::info!(image = container.image(), container = %id, "starting container");
        self.engine(&[
            "run",
            "-d",
            "--name",
            &id,
            "--entrypoint",
            "sleep",
            container.image(),
            KEEPALIVE_SECONDS,
        ])?;
        let guard = ContainerGuard {
            engine: self,
            id: id.clone(),
        };

        let staging = TempDir::new()?;
        let mut env: Vec<(String, EnvValue)> = Vec::new();
        let mut workdir = "/".to_string();
        let mut output = RunOutput::default();

        for (index, directive) in container.directives().iter().enumerate() {
            tracing::debug!(directive = %directive.describe(), "apply");
            let scratch = staging.path().join(index.to_string());
            match directive {
                Directive::Directory { path, tree } => {
                    tree.materialize(&scratch)?;
                    self.copy_in(&id, &scratch, path)?;
                }
                Directive::File { path, contents } => {
                    std::fs::write(&scratch, contents)?;
                    self.copy_file_in(&id, &scratch, path)?;
                }
                Directive::SecretFile { path, secret } => {
                    std::fs::write(&scratch, secret.plaintext()?)?;
                    let copied = self.copy_file_in(&id, &scratch, path);
                    std::fs::remove_file(&scratch)?;
                    copied?;
                }
                Directive::Env { name, value } => {
                    env.retain(|(n, _)| n != name);
                    env.push((name.clone(), EnvValue::Plain(value.clone())));
                }
                Directive::SecretEnv { name, secret } => {
                    env.retain(|(n, _)| n != name);
                    env.push((name.clone(), EnvValue::Secret(secret.clone())));
                }
                Directive::Workdir(path) => {
                    self.engine(&["exec", &id, "mkdir", "-p", path])?;
                    workdir = path.clone();
                }
                Directive::Exec(args) => {
                    let out = self.exec(&id, &workdir, &env, args)?;
                    let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                    if !out.status.success() {
                        return Err(ShipyardError::CommandFailed {
                            command: command_line(args),
                            exit_code: out.status.code().unwrap_or(-1),
                            stderr,
                        });
                    }
                    output.stdout = String::from_utf8_lossy(&out.stdout).into_owned();
                    output.stderr = stderr;
                }
            }
        }

        if let Some(path) = export {
            let dest = staging.path().join("export");
            std::fs::create_dir_all(&dest)?;
            self.engine(&["cp", &format!("{id}:{path}/."), &dest.display().to_string()])?;
            output.tree = Some(SourceTree::from_dir(&dest, &[])?);
        }

        drop(guard);
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
