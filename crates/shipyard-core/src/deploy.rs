//! Credential routing and `firebase deploy`.
//!
//! The credential is read and classified once. A service-account key is
//! mounted as a file and advertised through `GOOGLE_APPLICATION_CREDENTIALS`;
//! anything else is treated as an access token and exposed as a secret
//! environment variable.

use serde::{Deserialize, Serialize};

use crate::base::BaseEnvironment;
use crate::container::Container;
use crate::error::{Result, ShipyardError};
use crate::executor::Executor;
use crate::paths::{self, CREDENTIALS_FILE, SOURCE_MOUNT};
use crate::secret::Secret;
use crate::tree::SourceTree;

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "FIREBASE_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    ServiceAccountJson,
    AccessToken,
}

impl CredentialMode {
    /// Classify a credential's plaintext. Blank input is rejected rather than
    /// guessed at.
    pub fn classify(name: &str, plaintext: &str) -> Result<Self> {
        let trimmed = plaintext.trim();
        if trimmed.is_empty() {
            return Err(ShipyardError::EmptyCredential(name.to_string()));
        }
        if trimmed.starts_with('{') {
            Ok(CredentialMode::ServiceAccountJson)
        } else {
            Ok(CredentialMode::AccessToken)
        }
    }

    /// Attach `credential` to `container` the way this mode requires.
    pub fn attach(self, container: Container, credential: &Secret, token_env: &str) -> Container {
        match self {
            CredentialMode::ServiceAccountJson => container
                .with_secret_file(CREDENTIALS_FILE, credential)
                .with_env_variable(CREDENTIALS_ENV, CREDENTIALS_FILE),
            CredentialMode::AccessToken => container.with_secret_variable(token_env, credential),
        }
    }
}

/// Project and optional `--only` filter of one deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTarget {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<String>,
}

pub fn deploy_command(project_id: &str, only: Option<&str>) -> Vec<String> {
    let mut cmd: Vec<String> = ["firebase", "deploy", "--project", project_id, "--non-interactive", "--force"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(only) = only {
        cmd.push("--only".into());
        cmd.push(only.to_string());
    }
    cmd
}

#[derive(Debug, Clone)]
pub struct DeployRequest<'a> {
    pub target: &'a DeployTarget,
    pub credential: &'a Secret,
    pub firebase_dir: Option<&'a str>,
    /// Variable that carries an access token.
    pub access_token_env: &'a str,
}

/// Deploy `tree` and return the deploy tool's stdout.
pub fn deploy(
    executor: &dyn Executor,
    base: &BaseEnvironment,
    tree: &SourceTree,
    request: &DeployRequest<'_>,
) -> Result<String> {
    let mode = CredentialMode::classify(request.credential.name(), request.credential.plaintext()?)?;
    let workdir = paths::source_mount(request.firebase_dir)?;
    tracing::info!(
        project = %request.target.project_id,
        only = request.target.only.as_deref().unwrap_or("-"),
        ?mode,
        "deploying"
    );

    let container = base.container().with_directory(SOURCE_MOUNT, tree);
    let container = mode
        .attach(container, request.credential, request.access_token_env)
        .with_workdir(workdir)
        .with_exec(deploy_command(
            &request.target.project_id,
            request.target.only.as_deref(),
        ));
    Ok(executor.run(&container, None)?.stdout)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
