//! Declarative description of work to run inside a container image.
//!
//! A [`Container`] is a base image plus an ordered list of staging
//! [`Directive`]s. Building one has no side effects; an
//! [`Executor`](crate::executor::Executor) turns it into processes.

use crate::secret::Secret;
use crate::tree::{self, Blob, SourceTree};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub enum Directive {
    /// Merge a tree into the container filesystem at an absolute path.
    Directory { path: String, tree: SourceTree },
    /// Place a single file at an absolute path.
    File { path: String, contents: Blob },
    /// Write a secret's plaintext to a file at an absolute path.
    SecretFile { path: String, secret: Secret },
    Env { name: String, value: String },
    /// Environment variable whose value is a secret's plaintext.
    SecretEnv { name: String, secret: Secret },
    Workdir(String),
    Exec(Vec<String>),
}

impl Directive {
    /// One-line description with secret values redacted.
    pub fn describe(&self) -> String {
        match self {
            Directive::Directory { path, tree } => format!(
                "COPY tree:{} ({} files) {path}",
                &tree.digest()[..12],
                tree.len()
            ),
            Directive::File { path, contents } => {
                format!("FILE {path} ({} bytes)", contents.len())
            }
            Directive::SecretFile { path, secret } => {
                format!("SECRET FILE {path} <- {}", secret.name())
            }
            Directive::Env { name, value } => format!("ENV {name}={value}"),
            Directive::SecretEnv { name, secret } => {
                format!("SECRET ENV {name} <- {}", secret.name())
            }
            Directive::Workdir(path) => format!("WORKDIR {path}"),
            Directive::Exec(args) => format!("EXEC {}", command_line(args)),
        }
    }

    fn hash_into(&self, hasher: &mut Sha256) {
        let fields: Vec<String> = match self {
            Directive::Directory { path, tree } => {
                vec!["dir".into(), path.clone(), tree.digest()]
            }
            Directive::File { path, contents } => {
                vec!["file".into(), path.clone(), tree::hex(&Sha256::digest(contents))]
            }
            Directive::SecretFile { path, secret } => {
                vec!["secret-file".into(), path.clone(), secret.name().to_string()]
            }
            Directive::Env { name, value } => vec!["env".into(), name.clone(), value.clone()],
            Directive::SecretEnv { name, secret } => {
                vec!["secret-env".into(), name.clone(), secret.name().to_string()]
            }
            Directive::Workdir(path) => vec!["workdir".into(), path.clone()],
            Directive::Exec(args) => {
                let mut v = vec!["exec".to_string()];
                v.extend(args.iter().cloned());
                v
            }
        };
        for field in fields {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    image: String,
    directives: Vec<Directive>,
}

impl Container {
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            directives: Vec::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn with_directory(mut self, path: impl Into<String>, tree: &SourceTree) -> Self {
        self.directives.push(Directive::Directory {
            path: path.into(),
            tree: tree.clone(),
        });
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.directives.push(Directive::File {
            path: path.into(),
            contents: Blob::from(contents.as_ref()),
        });
        self
    }

    pub fn with_secret_file(mut self, path: impl Into<String>, secret: &Secret) -> Self {
        self.directives.push(Directive::SecretFile {
            path: path.into(),
            secret: secret.clone(),
        });
        self
    }

    pub fn with_env_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.push(Directive::Env {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_secret_variable(mut self, name: impl Into<String>, secret: &Secret) -> Self {
        self.directives.push(Directive::SecretEnv {
            name: name.into(),
            secret: secret.clone(),
        });
        self
    }

    pub fn with_workdir(mut self, path: impl Into<String>) -> Self {
        self.directives.push(Directive::Workdir(path.into()));
        self
    }

    pub fn with_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directives
            .push(Directive::Exec(args.into_iter().map(Into::into).collect()));
        self
    }

    /// Cache identity of the container state after `directives[..=index]`.
    ///
    /// Secrets contribute their name only, never their value.
    pub fn layer_key(&self, index: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.image.as_bytes());
        for directive in self.directives.iter().take(index + 1) {
            directive.hash_into(&mut hasher);
        }
        tree::hex(&hasher.finalize())
    }
}

/// Render an argument list the way a user would type it.
pub fn command_line(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if !a.is_empty()
                && a
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c))
            {
                a.clone()
            } else {
                format!("'{}'", a.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_order() {
        let c = Container::from_image("node:22-slim")
            .with_workdir("/src")
            .with_env_variable("CI", "true")
            .with_exec(["npm", "ci"]);
        let described: Vec<String> = c.directives().iter().map(|d| d.describe()).collect();
        assert_eq!(
            described,
            vec!["WORKDIR /src", "ENV CI=true", "EXEC npm ci"]
        );
    }

    #[test]
    fn layer_key_ignores_later_directives() {
        let tree = SourceTree::from_files([("package.json", "{}")]).unwrap();
        let a = Container::from_image("node:22-slim")
            .with_directory("/src", &tree)
            .with_exec(["npm", "ci"]);
        let b = a.clone().with_exec(["npm", "run", "build"]);
        assert_eq!(a.layer_key(1), b.layer_key(1));
        assert_ne!(b.layer_key(1), b.layer_key(2));
    }

    #[test]
    fn layer_key_ignores_secret_values() {
        let one = Secret::from_plaintext("token", "aaa");
        let two = Secret::from_plaintext("token", "bbb");
        let a = Container::from_image("x").with_secret_variable("T", &one);
        let b = Container::from_image("x").with_secret_variable("T", &two);
        assert_eq!(a.layer_key(0), b.layer_key(0));
        assert!(!a.directives()[0].describe().contains("aaa"));
    }

    #[test]
    fn command_line_quotes_when_needed() {
        let args: Vec<String> = ["git", "diff", "--name-only", "HEAD~1..HEAD", "a b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            command_line(&args),
            "git diff --name-only 'HEAD~1..HEAD' 'a b'"
        );
    }
}
