use crate::base::{BaseEnvironment, DEFAULT_GLOBAL_TOOLS, DEFAULT_IMAGE};
use crate::deploy::{CREDENTIALS_ENV, DEFAULT_ACCESS_TOKEN_ENV};
use crate::error::Result;
use crate::paths;
use crate::pipeline::Environment;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EnvironmentProjects
// ---------------------------------------------------------------------------

/// Firebase project id per deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProjects {
    #[serde(default)]
    pub development: String,
    #[serde(default)]
    pub staging: String,
    #[serde(default)]
    pub production: String,
}

impl EnvironmentProjects {
    pub fn for_environment(&self, env: Environment) -> &str {
        match env {
            Environment::Development => &self.development,
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
        }
    }
}

// ---------------------------------------------------------------------------
// FirebaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_dir: Option<String>,
    /// Directory holding `firebase.json`, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<String>,
    /// Variable carrying an access token in token mode.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default)]
    pub projects: EnvironmentProjects,
}

fn default_access_token_env() -> String {
    DEFAULT_ACCESS_TOKEN_ENV.to_string()
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            frontend_dir: None,
            backend_dir: None,
            firebase_dir: None,
            app_id: None,
            only: None,
            access_token_env: default_access_token_env(),
            projects: EnvironmentProjects::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// DenoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_task: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Contents of `shipyard.yaml`. Every field has a default, so a missing or
/// partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base image for npm and firebase stages.
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_global_tools")]
    pub global_tools: Vec<String>,
    /// Container engine binary (`docker`, `podman`).
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub firebase: FirebaseConfig,
    #[serde(default)]
    pub deno: DenoConfig,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_global_tools() -> Vec<String> {
    DEFAULT_GLOBAL_TOOLS.iter().map(|s| s.to_string()).collect()
}

fn default_engine() -> String {
    "docker".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: default_image(),
            global_tools: default_global_tools(),
            engine: default_engine(),
            firebase: FirebaseConfig::default(),
            deno: DenoConfig::default(),
        }
    }
}

impl Config {
    /// Load `shipyard.yaml` from `root`; a missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&paths::config_path(root))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    /// Write a default `shipyard.yaml` unless one exists. Returns true if
    /// written.
    pub fn init(root: &Path) -> Result<bool> {
        let data = serde_yaml::to_string(&Self::default())?;
        crate::io::write_if_missing(&paths::config_path(root), data.as_bytes())
    }

    pub fn base_environment(&self) -> BaseEnvironment {
        BaseEnvironment {
            image: self.image.clone(),
            global_tools: self.global_tools.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.image.trim().is_empty() {
            error("image must not be empty".to_string());
        }
        if self.engine.trim().is_empty() {
            error("engine must not be empty".to_string());
        }

        let dirs = [
            ("firebase.frontend_dir", &self.firebase.frontend_dir),
            ("firebase.backend_dir", &self.firebase.backend_dir),
            ("firebase.firebase_dir", &self.firebase.firebase_dir),
        ];
        for (field, dir) in dirs {
            if let Some(dir) = dir {
                if paths::normalize(dir).is_err() {
                    error(format!("{field} '{dir}' must stay inside the project"));
                }
            }
        }

        let token_env = self.firebase.access_token_env.trim();
        if token_env.is_empty() {
            error("firebase.access_token_env must not be empty".to_string());
        } else if token_env == CREDENTIALS_ENV {
            error(format!(
                "firebase.access_token_env must not be {CREDENTIALS_ENV}, which points at the key file"
            ));
        }

        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ] {
            if self.firebase.projects.for_environment(env).trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "firebase.projects.{env} is not set; deploy-env cannot target {env}"
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
