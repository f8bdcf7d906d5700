use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipyardError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path '{0}': must be relative and must not contain '..'")]
    InvalidPath(String),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    #[error("command `{command}` exited with code {exit_code}\nstderr: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("no project configured for {0}")]
    MissingProject(String),

    #[error("credential secret '{0}' is empty")]
    EmptyCredential(String),

    #[error("secret '{name}' is unavailable: {reason}")]
    SecretUnavailable { name: String, reason: String },

    #[error("invalid secret source '{0}': expected env:NAME or file:PATH")]
    InvalidSecretSource(String),

    #[error("container engine '{0}' not found on PATH")]
    EngineNotFound(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShipyardError>;
