use std::sync::Mutex;

use crate::container::{command_line, Container, Directive};
use crate::error::{Result, ShipyardError};
use crate::executor::{Executor, RunOutput};
use crate::paths;
use crate::tree::SourceTree;

/// Scripted outcome for execs whose arguments start with a given prefix.
#[derive(Debug, Clone, Default)]
pub struct Response {
    prefix: Vec<String>,
    exit_code: i32,
    stdout: String,
    stderr: String,
    /// Files (relative to the exec's workdir) the command "produces".
    files: Vec<(String, String)>,
}

impl Response {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn fail(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    fn matches(&self, args: &[String]) -> bool {
        args.len() >= self.prefix.len() && self.prefix.iter().zip(args).all(|(p, a)| p == a)
    }
}

/// One simulated command execution.
#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub args: Vec<String>,
    pub workdir: String,
    /// Plain environment variables in effect, in assignment order.
    pub env: Vec<(String, String)>,
    /// Names of secret-valued environment variables in effect.
    pub secret_env: Vec<String>,
    /// Files visible below the workdir when the command started.
    pub workdir_files: Vec<String>,
    /// [`Container::layer_key`] of this exec.
    pub layer_key: String,
}

impl RecordedExec {
    pub fn command(&self) -> String {
        command_line(&self.args)
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub container: Container,
    pub export: Option<String>,
    pub execs: Vec<RecordedExec>,
}

/// In-memory executor. Directory and file directives are applied to a
/// simulated filesystem; execs succeed with empty output unless a scripted
/// [`Response`] matches.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    responses: Vec<Response>,
    runs: Mutex<Vec<RecordedRun>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer execs starting with `prefix`. Earlier registrations win.
    pub fn respond(mut self, prefix: &[&str], mut response: Response) -> Self {
        response.prefix = prefix.iter().map(|s| s.to_string()).collect();
        self.responses.push(response);
        self
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Every exec across all runs, in execution order.
    pub fn execs(&self) -> Vec<RecordedExec> {
        self.runs().into_iter().flat_map(|r| r.execs).collect()
    }

    fn response_for(&self, args: &[String]) -> Option<&Response> {
        self.responses.iter().find(|r| r.matches(args))
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, container: &Container, export: Option<&str>) -> Result<RunOutput> {
        let mut fs = SourceTree::new();
        let mut workdir = "/".to_string();
        let mut env: Vec<(String, String)> = Vec::new();
        let mut secret_env: Vec<String> = Vec::new();
        let mut execs = Vec::new();
        let mut output = RunOutput::default();

        let record = |execs: Vec<RecordedExec>| {
            if let Ok(mut runs) = self.runs.lock() {
                runs.push(RecordedRun {
                    container: container.clone(),
                    export: export.map(str::to_string),
                    execs,
                });
            }
        };

        for (index, directive) in container.directives().iter().enumerate() {
            tracing::debug!(directive = %directive.describe(), "dry run");
            match directive {
                Directive::Directory { path, tree } => {
                    fs = fs.with_directory(path, tree)?;
                }
                Directive::File { path, contents } => {
                    fs = fs.with_new_file(path, contents)?;
                }
                Directive::SecretFile { path, secret } => {
                    fs = fs.with_new_file(path, secret.plaintext()?)?;
                }
                Directive::Env { name, value } => {
                    secret_env.retain(|n| n != name);
                    env.push((name.clone(), value.clone()));
                }
                Directive::SecretEnv { name, secret } => {
                    secret.plaintext()?;
                    env.retain(|(n, _)| n != name);
                    if !secret_env.contains(name) {
                        secret_env.push(name.clone());
                    }
                }
                Directive::Workdir(path) => workdir = path.clone(),
                Directive::Exec(args) => {
                    let workdir_files = fs.directory(&workdir)?.paths().map(String::from).collect();
                    execs.push(RecordedExec {
                        args: args.clone(),
                        workdir: workdir.clone(),
                        env: env.clone(),
                        secret_env: secret_env.clone(),
                        workdir_files,
                        layer_key: container.layer_key(index),
                    });

                    let response = self.response_for(args).cloned().unwrap_or_default();
                    if response.exit_code != 0 {
                        record(execs);
                        return Err(ShipyardError::CommandFailed {
                            command: command_line(args),
                            exit_code: response.exit_code,
                            stderr: response.stderr,
                        });
                    }
                    for (rel, contents) in &response.files {
                        fs = fs.with_new_file(&paths::absolute(&workdir, rel), contents)?;
                    }
                    output.stdout = response.stdout;
                    output.stderr = response.stderr;
                }
            }
        }

        if let Some(path) = export {
            output.tree = Some(fs.directory(path)?);
        }
        record(execs);
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::Secret;

    #[test]
    fn exports_simulated_filesystem() {
        let src = SourceTree::from_files([("a.txt", "1")]).unwrap();
        let exec = RecordingExecutor::new().respond(
            &["make"],
            Response::ok("built").with_file("out/bin", "elf"),
        );
        let c = Container::from_image("alpine")
            .with_directory("/src", &src)
            .with_workdir("/src")
            .with_exec(["make"]);
        let out = exec.run(&c, Some("/src")).unwrap();
        assert_eq!(out.stdout, "built");
        let tree = out.into_tree().unwrap();
        assert_eq!(tree.read_file("out/bin").unwrap(), "elf");
        assert_eq!(tree.read_file("a.txt").unwrap(), "1");
    }

    #[test]
    fn failing_response_aborts_and_records() {
        let exec = RecordingExecutor::new().respond(&["false"], Response::fail(2, "nope"));
        let c = Container::from_image("alpine")
            .with_exec(["false"])
            .with_exec(["echo", "never"]);
        let err = exec.run(&c, None).unwrap_err();
        match err {
            ShipyardError::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "false");
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(exec.execs().len(), 1);
    }

    #[test]
    fn tracks_env_and_secret_env() {
        let token = Secret::from_plaintext("tok", "abc");
        let c = Container::from_image("alpine")
            .with_env_variable("A", "1")
            .with_secret_variable("TOKEN", &token)
            .with_env_variable("A", "2")
            .with_exec(["env"]);
        let exec = RecordingExecutor::new();
        exec.run(&c, None).unwrap();
        let execs = exec.execs();
        let recorded = &execs[0];
        assert_eq!(recorded.env_value("A"), Some("2"));
        assert_eq!(recorded.secret_env, vec!["TOKEN"]);
        assert_eq!(recorded.workdir, "/");
    }
}
