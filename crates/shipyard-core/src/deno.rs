//! Deno Deploy through `deployctl`.

use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::error::Result;
use crate::executor::Executor;
use crate::paths::SOURCE_MOUNT;
use crate::secret::Secret;
use crate::tree::SourceTree;

pub const DENO_IMAGE: &str = "denoland/deno:alpine";
pub const TOKEN_ENV: &str = "DENO_DEPLOY_TOKEN";
const DEPLOYCTL_INSTALL: [&str; 5] = ["deno", "install", "-Arf", "--global", "jsr:@deno/deployctl"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenoDeployOptions {
    pub project: String,
    pub org: String,
    pub entrypoint: String,
    /// `--prod` when true, otherwise `--preview`.
    pub prod: bool,
    /// `deno task` to run before deploying.
    #[serde(default)]
    pub build_task: Option<String>,
    /// Paths passed as a single `--include=` list.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_image")]
    pub image: String,
}

fn default_image() -> String {
    DENO_IMAGE.to_string()
}

impl DenoDeployOptions {
    pub fn new(project: impl Into<String>, org: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            org: org.into(),
            entrypoint: entrypoint.into(),
            prod: false,
            build_task: None,
            include: Vec::new(),
            image: default_image(),
        }
    }

    pub fn deploy_command(&self) -> Vec<String> {
        let mode = if self.prod { "--prod" } else { "--preview" };
        let mut cmd: Vec<String> = [
            "deployctl",
            "deploy",
            mode,
            "--project",
            self.project.as_str(),
            "--org",
            self.org.as_str(),
            "--entrypoint",
            self.entrypoint.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if !self.include.is_empty() {
            cmd.push(format!("--include={}", self.include.join(",")));
        }
        cmd
    }
}

/// Deploy `source` and return `deployctl`'s stdout.
pub fn deno_deploy(
    executor: &dyn Executor,
    source: &SourceTree,
    token: &Secret,
    opts: &DenoDeployOptions,
) -> Result<String> {
    let mut container = Container::from_image(&opts.image)
        .with_secret_variable(TOKEN_ENV, token)
        .with_exec(DEPLOYCTL_INSTALL)
        .with_directory(SOURCE_MOUNT, source)
        .with_workdir(SOURCE_MOUNT);
    if let Some(task) = &opts.build_task {
        container = container.with_exec(["deno", "task", task.as_str()]);
    }
    container = container.with_exec(opts.deploy_command());

    tracing::info!(project = %opts.project, org = %opts.org, prod = opts.prod, "deploying to deno deploy");
    Ok(executor.run(&container, None)?.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RecordingExecutor, Response};

    #[test]
    fn preview_deploy_without_task() {
        let exec = RecordingExecutor::new()
            .respond(&["deployctl"], Response::ok("✔ Deployment complete."));
        let token = Secret::from_plaintext("deno", "ddp_secret");
        let source = SourceTree::from_files([("main.ts", "Deno.serve(() => new Response())")]).unwrap();
        let out = deno_deploy(&exec, &source, &token, &DenoDeployOptions::new("site", "acme", "main.ts"))
            .unwrap();
        assert_eq!(out, "✔ Deployment complete.");

        let commands: Vec<String> = exec.execs().iter().map(|e| e.command()).collect();
        assert_eq!(
            commands,
            vec![
                "deno install -Arf --global jsr:@deno/deployctl",
                "deployctl deploy --preview --project site --org acme --entrypoint main.ts",
            ]
        );
        let execs = exec.execs();
        assert_eq!(execs[0].secret_env, vec![TOKEN_ENV]);
        assert_eq!(execs[1].workdir, "/src");
    }

    #[test]
    fn prod_deploy_with_task_and_include() {
        let exec = RecordingExecutor::new();
        let token = Secret::from_plaintext("deno", "ddp_secret");
        let mut opts = DenoDeployOptions::new("docs", "acme", "serve.ts");
        opts.prod = true;
        opts.build_task = Some("lume-build".into());
        opts.include = vec!["site/".into(), "deno.json".into()];
        deno_deploy(&exec, &SourceTree::new(), &token, &opts).unwrap();

        let execs = exec.execs();
        assert_eq!(execs[1].command(), "deno task lume-build");
        assert_eq!(
            execs[2].args.last().map(String::as_str),
            Some("--include=site/,deno.json")
        );
        assert_eq!(execs[2].args[2], "--prod");
    }

    #[test]
    fn failing_task_stops_deploy() {
        let exec = RecordingExecutor::new()
            .respond(&["deno", "task"], Response::fail(1, "task not found"));
        let token = Secret::from_plaintext("deno", "t");
        let mut opts = DenoDeployOptions::new("docs", "acme", "serve.ts");
        opts.build_task = Some("missing".into());
        assert!(deno_deploy(&exec, &SourceTree::new(), &token, &opts).is_err());
        assert!(exec.execs().iter().all(|e| e.args[0] != "deployctl"));
    }
}
