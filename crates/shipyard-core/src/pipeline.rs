//! Firebase pipeline: install → `.env` → build → deploy, environment
//! selection from CI event data, and lint.

use serde::{Deserialize, Serialize};

use crate::base::BaseEnvironment;
use crate::build;
use crate::config::{EnvironmentProjects, FirebaseConfig};
use crate::deploy::{self, DeployRequest, DeployTarget, DEFAULT_ACCESS_TOKEN_ENV};
use crate::env_file::{self, EnvSources};
use crate::error::{Result, ShipyardError};
use crate::executor::Executor;
use crate::install;
use crate::paths::{self, SOURCE_MOUNT};
use crate::secret::Secret;
use crate::tree::SourceTree;

pub const LINT_COMMAND: [&str; 4] = ["npm", "run", "lint", "--if-present"];
pub const DEFAULT_ONLY: &str = "hosting";
const PRODUCTION_TAG_PREFIX: &str = "refs/tags/v";

/// Project layout inside the source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDirs {
    pub frontend_dir: Option<String>,
    pub backend_dir: Option<String>,
    /// Directory holding `firebase.json`.
    pub firebase_dir: Option<String>,
}

impl From<&FirebaseConfig> for ProjectDirs {
    fn from(cfg: &FirebaseConfig) -> Self {
        Self {
            frontend_dir: cfg.frontend_dir.clone(),
            backend_dir: cfg.backend_dir.clone(),
            firebase_dir: cfg.firebase_dir.clone(),
        }
    }
}

/// Inputs of one `firebase_deploy` run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub target: DeployTarget,
    pub credential: Secret,
    pub app_id: Option<String>,
    pub webapp_config: Option<Secret>,
    pub extra_env: Option<Secret>,
    pub dirs: ProjectDirs,
}

// ---------------------------------------------------------------------------
// Environment selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn for_event(event: &str, git_ref: &str) -> Self {
        match event {
            "push" if git_ref.starts_with(PRODUCTION_TAG_PREFIX) => Environment::Production,
            "push" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the project and `--only` filter for a CI event. Pure.
///
/// Tag pushes matching `refs/tags/v*` go to production, other pushes to
/// staging, everything else to development. `push` and `pull_request`
/// default `only` to `hosting`.
pub fn select_deploy_target(
    event: &str,
    git_ref: &str,
    projects: &EnvironmentProjects,
    only: Option<&str>,
) -> (Environment, DeployTarget) {
    let environment = Environment::for_event(event, git_ref);
    let only = match (only, event) {
        (Some(only), _) => Some(only.to_string()),
        (None, "push" | "pull_request") => Some(DEFAULT_ONLY.to_string()),
        (None, _) => None,
    };
    let target = DeployTarget {
        project_id: projects.for_environment(environment).to_string(),
        only,
    };
    (environment, target)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline<E> {
    executor: E,
    base: BaseEnvironment,
    access_token_env: String,
}

impl<E: Executor> Pipeline<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            base: BaseEnvironment::default(),
            access_token_env: DEFAULT_ACCESS_TOKEN_ENV.to_string(),
        }
    }

    pub fn with_base(mut self, base: BaseEnvironment) -> Self {
        self.base = base;
        self
    }

    pub fn with_access_token_env(mut self, name: impl Into<String>) -> Self {
        self.access_token_env = name.into();
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn base(&self) -> &BaseEnvironment {
        &self.base
    }

    pub fn install_dependencies(
        &self,
        source: &SourceTree,
        frontend_dir: Option<&str>,
        backend_dir: Option<&str>,
    ) -> Result<SourceTree> {
        install::install_dependencies(&self.executor, &self.base, source, frontend_dir, backend_dir)
    }

    pub fn build(
        &self,
        tree: &SourceTree,
        frontend_dir: Option<&str>,
        backend_dir: Option<&str>,
    ) -> Result<SourceTree> {
        build::build(&self.executor, &self.base, tree, frontend_dir, backend_dir)
    }

    pub fn deploy(
        &self,
        tree: &SourceTree,
        target: &DeployTarget,
        credential: &Secret,
        firebase_dir: Option<&str>,
    ) -> Result<String> {
        deploy::deploy(
            &self.executor,
            &self.base,
            tree,
            &DeployRequest {
                target,
                credential,
                firebase_dir,
                access_token_env: &self.access_token_env,
            },
        )
    }

    /// Install, synthesize `.env`, build, deploy. Any failing stage aborts
    /// the rest. Returns the deploy output.
    pub fn firebase_deploy(&self, source: &SourceTree, opts: &DeployOptions) -> Result<String> {
        let frontend = opts.dirs.frontend_dir.as_deref();
        let backend = opts.dirs.backend_dir.as_deref();

        tracing::info!(project = %opts.target.project_id, "firebase deploy: installing");
        let installed = self.install_dependencies(source, frontend, backend)?;

        let configured = env_file::synthesize_env(
            &installed,
            &EnvSources {
                frontend_dir: frontend,
                project_id: &opts.target.project_id,
                app_id: opts.app_id.as_deref(),
                webapp_config: opts.webapp_config.as_ref(),
                extra_env: opts.extra_env.as_ref(),
            },
        )?;

        tracing::info!("firebase deploy: building");
        let built = self.build(&configured, frontend, backend)?;

        self.deploy(
            &built,
            &opts.target,
            &opts.credential,
            opts.dirs.firebase_dir.as_deref(),
        )
    }

    /// Resolve the target from CI event data, then [`Self::firebase_deploy`].
    /// Only `opts.target.only` is used from `opts.target`. An environment
    /// without a project id fails with `MissingProject` before anything runs.
    pub fn deploy_to_env(
        &self,
        source: &SourceTree,
        event: &str,
        git_ref: &str,
        projects: &EnvironmentProjects,
        opts: DeployOptions,
    ) -> Result<String> {
        let (environment, target) =
            select_deploy_target(event, git_ref, projects, opts.target.only.as_deref());
        if target.project_id.trim().is_empty() {
            return Err(ShipyardError::MissingProject(environment.to_string()));
        }
        tracing::info!(%environment, event, git_ref, project = %target.project_id, "selected environment");
        self.firebase_deploy(source, &DeployOptions { target, ..opts })
    }

    /// Install dependencies, then `npm run lint --if-present` in each
    /// directory. Projects without a lint script pass.
    pub fn lint(
        &self,
        source: &SourceTree,
        frontend_dir: Option<&str>,
        backend_dir: Option<&str>,
    ) -> Result<()> {
        let installed = self.install_dependencies(source, frontend_dir, backend_dir)?;
        let mut container = self.base.container().with_directory(SOURCE_MOUNT, &installed);
        for dir in [frontend_dir, backend_dir].into_iter().flatten() {
            container = container
                .with_workdir(paths::source_mount(Some(dir))?)
                .with_exec(LINT_COMMAND);
        }
        self.executor.run(&container, None)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn projects() -> EnvironmentProjects {
        EnvironmentProjects {
            development: "demo-dev".into(),
            staging: "demo-staging".into(),
            production: "demo-prod".into(),
        }
    }

    #[test]
    fn version_tag_push_goes_to_production() {
        let (env, target) = select_deploy_target("push", "refs/tags/v2.0.0", &projects(), None);
        assert_eq!(env, Environment::Production);
        assert_eq!(target.project_id, "demo-prod");
        assert_eq!(target.only.as_deref(), Some("hosting"));
    }

    #[test]
    fn branch_push_goes_to_staging() {
        let (env, target) = select_deploy_target("push", "refs/heads/main", &projects(), None);
        assert_eq!(env, Environment::Staging);
        assert_eq!(target.project_id, "demo-staging");
        assert_eq!(target.only.as_deref(), Some("hosting"));
    }

    #[test]
    fn non_version_tag_push_goes_to_staging() {
        let (env, _) = select_deploy_target("push", "refs/tags/release-1", &projects(), None);
        assert_eq!(env, Environment::Staging);
    }

    #[test]
    fn pull_request_goes_to_development() {
        let (env, target) =
            select_deploy_target("pull_request", "refs/tags/v9.9.9", &projects(), None);
        assert_eq!(env, Environment::Development);
        assert_eq!(target.project_id, "demo-dev");
        assert_eq!(target.only.as_deref(), Some("hosting"));
    }

    #[test]
    fn other_events_fall_back_to_development_without_only() {
        let (env, target) = select_deploy_target("workflow_dispatch", "", &projects(), None);
        assert_eq!(env, Environment::Development);
        assert_eq!(target.project_id, "demo-dev");
        assert_eq!(target.only, None);
    }

    #[test]
    fn explicit_only_is_kept() {
        let (_, target) =
            select_deploy_target("push", "refs/heads/main", &projects(), Some("functions"));
        assert_eq!(target.only.as_deref(), Some("functions"));
    }
}
