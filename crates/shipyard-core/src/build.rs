use crate::base::BaseEnvironment;
use crate::error::Result;
use crate::executor::Executor;
use crate::paths::{self, SOURCE_MOUNT};
use crate::tree::SourceTree;

pub const BUILD_COMMAND: [&str; 3] = ["npm", "run", "build"];

/// Run `npm run build` in the frontend then the backend directory and return
/// the `/src` tree with whatever the builds wrote.
pub fn build(
    executor: &dyn Executor,
    base: &BaseEnvironment,
    tree: &SourceTree,
    frontend_dir: Option<&str>,
    backend_dir: Option<&str>,
) -> Result<SourceTree> {
    let mut container = base.container().with_directory(SOURCE_MOUNT, tree);
    for dir in [frontend_dir, backend_dir].into_iter().flatten() {
        let workdir = paths::source_mount(Some(dir))?;
        tracing::info!(workdir = %workdir, "building");
        container = container.with_workdir(workdir).with_exec(BUILD_COMMAND);
    }
    executor.run(&container, Some(SOURCE_MOUNT))?.into_tree()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShipyardError;
    use crate::executor::{RecordingExecutor, Response};

    #[test]
    fn builds_frontend_then_backend() {
        let tree = SourceTree::from_files([("web/package.json", "{}"), ("api/package.json", "{}")])
            .unwrap();
        let exec = RecordingExecutor::new()
            .respond(&["npm", "run", "build"], Response::ok("").with_file("dist/index.html", "ok"));
        let out = build(&exec, &BaseEnvironment::default(), &tree, Some("web"), Some("api")).unwrap();

        let builds: Vec<String> = exec
            .execs()
            .into_iter()
            .filter(|e| e.args == BUILD_COMMAND)
            .map(|e| e.workdir)
            .collect();
        assert_eq!(builds, vec!["/src/web", "/src/api"]);
        assert_eq!(out.read_file("web/dist/index.html").unwrap(), "ok");
        assert_eq!(out.read_file("api/dist/index.html").unwrap(), "ok");
    }

    #[test]
    fn frontend_failure_skips_backend() {
        let tree = SourceTree::from_files([("web/package.json", "{}")]).unwrap();
        let exec = RecordingExecutor::new()
            .respond(&["npm", "run", "build"], Response::fail(2, "vite: type error"));
        let err = build(&exec, &BaseEnvironment::default(), &tree, Some("web"), Some("api"))
            .unwrap_err();
        assert!(matches!(err, ShipyardError::CommandFailed { exit_code: 2, .. }));
        assert_eq!(exec.execs().iter().filter(|e| e.args == BUILD_COMMAND).count(), 1);
    }

    #[test]
    fn no_dirs_returns_tree() {
        let tree = SourceTree::from_files([("firebase.json", "{}")]).unwrap();
        let exec = RecordingExecutor::new();
        let out = build(&exec, &BaseEnvironment::default(), &tree, None, None).unwrap();
        assert_eq!(out, tree);
    }
}
