//! Lockfile-aware npm installs staged for layer reuse.
//!
//! For each project directory the manifest (and lockfile, when present) is
//! staged alone before the install runs, so the install layer depends only on
//! the base image and those files. Full directory content and the rest of the
//! source tree are merged only after every install has executed.

use crate::base::BaseEnvironment;
use crate::error::Result;
use crate::executor::Executor;
use crate::paths::{self, PACKAGE_JSON, PACKAGE_LOCK, SOURCE_MOUNT};
use crate::tree::SourceTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// `npm ci` against the lockfile.
    Reproducible,
    /// `npm install`, resolving versions from `package.json`.
    Resolving,
}

impl InstallStrategy {
    pub fn for_lockfile(present: bool) -> Self {
        if present {
            InstallStrategy::Reproducible
        } else {
            InstallStrategy::Resolving
        }
    }

    pub fn command(self) -> [&'static str; 3] {
        match self {
            InstallStrategy::Reproducible => ["npm", "ci", "--legacy-peer-deps"],
            InstallStrategy::Resolving => ["npm", "install", "--legacy-peer-deps"],
        }
    }
}

/// Install npm dependencies for the frontend then the backend directory and
/// return the whole `/src` tree with `node_modules` in place.
///
/// Every manifest stage and install runs before any full directory is
/// merged, so no install layer depends on source files outside the
/// manifests. A directory without `package.json` is copied through without
/// an install. A failing install aborts with the executor's `CommandFailed`
/// error.
pub fn install_dependencies(
    executor: &dyn Executor,
    base: &BaseEnvironment,
    source: &SourceTree,
    frontend_dir: Option<&str>,
    backend_dir: Option<&str>,
) -> Result<SourceTree> {
    let mut container = base.container();
    let mut merges = Vec::new();

    for dir in [frontend_dir, backend_dir].into_iter().flatten() {
        let rel = paths::normalize(dir)?;
        let mount = paths::absolute(SOURCE_MOUNT, &rel);
        let subtree = source.directory(&rel)?;

        match subtree.read_bytes(PACKAGE_JSON) {
            Ok(manifest) => {
                container = container.with_file(paths::absolute(&mount, PACKAGE_JSON), manifest);
                let lockfile = subtree.read_bytes(PACKAGE_LOCK).ok();
                let strategy = InstallStrategy::for_lockfile(lockfile.is_some());
                if let Some(lock) = lockfile {
                    container = container.with_file(paths::absolute(&mount, PACKAGE_LOCK), lock);
                }
                tracing::info!(dir = %rel, ?strategy, "installing dependencies");
                container = container
                    .with_workdir(mount.clone())
                    .with_exec(strategy.command());
            }
            Err(_) => tracing::warn!(dir = %rel, "no package.json, skipping install"),
        }
        merges.push((mount, subtree));
    }

    for (mount, subtree) in &merges {
        container = container.with_directory(mount.as_str(), subtree);
    }
    let container = container.with_directory(SOURCE_MOUNT, source);
    executor.run(&container, Some(SOURCE_MOUNT))?.into_tree()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Directive;
    use crate::error::ShipyardError;
    use crate::executor::{RecordingExecutor, Response};

    fn project(extra: &[(&str, &str)]) -> SourceTree {
        let mut files = vec![
            ("firebase.json", "{}"),
            ("web/package.json", r#"{"name":"web"}"#),
            ("web/package-lock.json", r#"{"lockfileVersion":3}"#),
            ("web/src/main.ts", "console.log(1)"),
            ("functions/package.json", r#"{"name":"fn"}"#),
            ("functions/index.js", "exports.x = 1"),
        ];
        files.extend_from_slice(extra);
        SourceTree::from_files(files).unwrap()
    }

    fn install_commands(exec: &RecordingExecutor) -> Vec<String> {
        exec.execs()
            .iter()
            .filter(|e| e.args.get(2).map(String::as_str) == Some("--legacy-peer-deps"))
            .map(|e| format!("{} @ {}", e.command(), e.workdir))
            .collect()
    }

    #[test]
    fn lockfile_selects_reproducible_install() {
        let exec = RecordingExecutor::new();
        install_dependencies(
            &exec,
            &BaseEnvironment::default(),
            &project(&[]),
            Some("web"),
            Some("functions"),
        )
        .unwrap();
        assert_eq!(
            install_commands(&exec),
            vec![
                "npm ci --legacy-peer-deps @ /src/web",
                "npm install --legacy-peer-deps @ /src/functions",
            ]
        );
    }

    #[test]
    fn install_sees_only_manifests() {
        let exec = RecordingExecutor::new();
        install_dependencies(&exec, &BaseEnvironment::default(), &project(&[]), Some("web"), None)
            .unwrap();
        let execs = exec.execs();
        let install = execs.iter().find(|e| e.args[..2] == ["npm", "ci"]).unwrap();
        assert_eq!(install.workdir_files, vec!["package-lock.json", "package.json"]);
    }

    #[test]
    fn missing_manifest_skips_install_and_copies_through() {
        let source = SourceTree::from_files([
            ("site/index.html", "<h1>hi</h1>"),
            ("site/app.js", "1"),
        ])
        .unwrap();
        let exec = RecordingExecutor::new();
        let out = install_dependencies(&exec, &BaseEnvironment::default(), &source, Some("site"), None)
            .unwrap();
        assert_eq!(out.directory("site").unwrap(), source.directory("site").unwrap());
        assert!(exec
            .execs()
            .iter()
            .all(|e| e.args.get(2).map(String::as_str) != Some("--legacy-peer-deps")));
    }

    #[test]
    fn unrelated_edits_keep_install_layer() {
        let install_keys = |source: &SourceTree| {
            let exec = RecordingExecutor::new();
            install_dependencies(&exec, &BaseEnvironment::default(), source, Some("web"), Some("functions"))
                .unwrap();
            exec.execs()
                .into_iter()
                .filter(|e| e.args.get(2).map(String::as_str) == Some("--legacy-peer-deps"))
                .map(|e| (e.layer_key, e.workdir_files))
                .collect::<Vec<_>>()
        };

        let before = install_keys(&project(&[]));
        let top_level = install_keys(&project(&[("README.md", "changed"), (".firebaserc", "{}")]));
        assert_eq!(before.len(), 2);
        assert_eq!(before, top_level);

        // Frontend source edits reach neither install layer.
        let web_edit = install_keys(
            &project(&[]).with_new_file("web/src/main.ts", "console.log(2)").unwrap(),
        );
        assert_eq!(before[0], web_edit[0]);
        assert_eq!(before[1], web_edit[1]);

        let manifest_edit = install_keys(
            &project(&[]).with_new_file("web/package.json", r#"{"name":"web2"}"#).unwrap(),
        );
        assert_ne!(before[0].0, manifest_edit[0].0);
    }

    #[test]
    fn unmanaged_frontend_does_not_affect_backend_install() {
        let site = |body: &str| {
            SourceTree::from_files([
                ("site/index.html", body),
                ("functions/package.json", r#"{"name":"fn"}"#),
                ("functions/index.js", "exports.x = 1"),
            ])
            .unwrap()
        };
        let backend_key = |source: &SourceTree| {
            let exec = RecordingExecutor::new();
            install_dependencies(&exec, &BaseEnvironment::default(), source, Some("site"), Some("functions"))
                .unwrap();
            exec.execs()
                .into_iter()
                .find(|e| e.workdir == "/src/functions")
                .map(|e| e.layer_key)
                .unwrap()
        };
        assert_eq!(backend_key(&site("<h1>a</h1>")), backend_key(&site("<h1>b</h1>")));
    }

    #[test]
    fn full_directories_merge_after_every_install() {
        let exec = RecordingExecutor::new();
        install_dependencies(&exec, &BaseEnvironment::default(), &project(&[]), Some("web"), Some("functions"))
            .unwrap();
        let runs = exec.runs();
        let directives = runs[0].container.directives();
        let last_exec = directives
            .iter()
            .rposition(|d| matches!(d, Directive::Exec(_)))
            .unwrap();
        let first_dir = directives
            .iter()
            .position(|d| matches!(d, Directive::Directory { .. }))
            .unwrap();
        assert!(first_dir > last_exec);
    }

    #[test]
    fn installed_tree_keeps_full_source() {
        let exec = RecordingExecutor::new().respond(
            &["npm", "ci"],
            Response::ok("added 1 package").with_file("node_modules/left-pad/index.js", "pad"),
        );
        let source = project(&[]);
        let out = install_dependencies(&exec, &BaseEnvironment::default(), &source, Some("web"), None)
            .unwrap();
        assert_eq!(out.read_file("web/node_modules/left-pad/index.js").unwrap(), "pad");
        for path in source.paths() {
            assert!(out.contains(path), "missing {path}");
        }
    }

    #[test]
    fn install_failure_propagates() {
        let exec = RecordingExecutor::new()
            .respond(&["npm", "ci"], Response::fail(1, "npm ERR! ERESOLVE"));
        let err = install_dependencies(&exec, &BaseEnvironment::default(), &project(&[]), Some("web"), None)
            .unwrap_err();
        match err {
            ShipyardError::CommandFailed {
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(command, "npm ci --legacy-peer-deps");
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "npm ERR! ERESOLVE");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(exec.execs().len(), 2);
    }
}
