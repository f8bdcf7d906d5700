//! Opaque credential values.
//!
//! A [`Secret`] only knows how to produce its plaintext. The plaintext is
//! fetched from its source on first use and cached for the lifetime of the
//! value (and its clones), so a pipeline run reads each credential once.

use crate::error::{Result, ShipyardError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Read from an environment variable of the current process.
    Env(String),
    /// Read from a file on disk.
    File(PathBuf),
    /// Held in memory. Used by callers that already own the value.
    Literal,
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Env(name) => write!(f, "env:{name}"),
            SecretSource::File(path) => write!(f, "file:{}", path.display()),
            SecretSource::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for SecretSource {
    type Err = ShipyardError;
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("env", name)) if !name.trim().is_empty() => {
                Ok(SecretSource::Env(name.trim().to_string()))
            }
            Some(("file", path)) if !path.trim().is_empty() => {
                Ok(SecretSource::File(PathBuf::from(path.trim())))
            }
            _ => Err(ShipyardError::InvalidSecretSource(s.to_string())),
        }
    }
}

struct Inner {
    name: String,
    source: SecretSource,
    value: OnceLock<String>,
}

#[derive(Clone)]
pub struct Secret(Arc<Inner>);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.0.name)
            .field("source", &self.0.source)
            .finish_non_exhaustive()
    }
}

impl Secret {
    pub fn new(name: impl Into<String>, source: SecretSource) -> Self {
        Self(Arc::new(Inner {
            name: name.into(),
            source,
            value: OnceLock::new(),
        }))
    }

    pub fn from_plaintext(name: impl Into<String>, value: impl Into<String>) -> Self {
        let secret = Self::new(name, SecretSource::Literal);
        let _ = secret.0.value.set(value.into());
        secret
    }

    /// Parse an `env:NAME` / `file:PATH` reference.
    pub fn parse(name: impl Into<String>, reference: &str) -> Result<Self> {
        Ok(Self::new(name, reference.parse()?))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn source(&self) -> &SecretSource {
        &self.0.source
    }

    /// The secret's plaintext. The source is consulted at most once.
    pub fn plaintext(&self) -> Result<&str> {
        if let Some(v) = self.0.value.get() {
            return Ok(v.as_str());
        }
        let value = self.fetch()?;
        Ok(self.0.value.get_or_init(|| value).as_str())
    }

    fn fetch(&self) -> Result<String> {
        let unavailable = |reason: String| ShipyardError::SecretUnavailable {
            name: self.0.name.clone(),
            reason,
        };
        match &self.0.source {
            SecretSource::Env(var) => {
                std::env::var(var).map_err(|e| unavailable(format!("{var}: {e}")))
            }
            SecretSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| unavailable(format!("{}: {e}", path.display()))),
            SecretSource::Literal => Err(unavailable("no value set".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_sources() {
        assert_eq!(
            "env:GCP_CREDENTIALS".parse::<SecretSource>().unwrap(),
            SecretSource::Env("GCP_CREDENTIALS".into())
        );
        assert_eq!(
            "file:/run/secrets/key.json".parse::<SecretSource>().unwrap(),
            SecretSource::File(PathBuf::from("/run/secrets/key.json"))
        );
        for bad in ["GCP_CREDENTIALS", "env:", "cmd:echo hi", ""] {
            assert!(
                matches!(
                    bad.parse::<SecretSource>(),
                    Err(ShipyardError::InvalidSecretSource(_))
                ),
                "expected invalid: {bad}"
            );
        }
    }

    #[test]
    fn file_secret_is_read_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first").unwrap();

        let secret = Secret::new("token", SecretSource::File(path.clone()));
        assert_eq!(secret.plaintext().unwrap(), "first");

        std::fs::write(&path, "second").unwrap();
        let cloned = secret.clone();
        assert_eq!(cloned.plaintext().unwrap(), "first");
    }

    #[test]
    fn missing_env_secret_is_unavailable() {
        let secret = Secret::new(
            "token",
            SecretSource::Env("SHIPYARD_TEST_SURELY_UNSET_VAR".into()),
        );
        assert!(matches!(
            secret.plaintext(),
            Err(ShipyardError::SecretUnavailable { .. })
        ));
    }

    #[test]
    fn debug_never_prints_value() {
        let secret = Secret::from_plaintext("token", "ya29.super-secret");
        let shown = format!("{secret:?}");
        assert!(shown.contains("token"));
        assert!(!shown.contains("super-secret"));
    }
}
