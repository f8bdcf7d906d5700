//! Changed-file listings from git, run inside `alpine/git`.
//!
//! The source tree must include its `.git` directory.

use crate::container::Container;
use crate::error::{Result, ShipyardError};
use crate::executor::Executor;
use crate::paths::GIT_MOUNT;
use crate::tree::SourceTree;

pub const GIT_IMAGE: &str = "alpine/git:latest";

fn git_container(source: &SourceTree) -> Container {
    Container::from_image(GIT_IMAGE)
        .with_directory(GIT_MOUNT, source)
        .with_workdir(GIT_MOUNT)
}

fn run_git(executor: &dyn Executor, source: &SourceTree, args: &[&str]) -> Result<Vec<String>> {
    let container = git_container(source).with_exec(args.iter().copied());
    let output = executor.run(&container, None)?;
    Ok(parse_file_list(&output.stdout))
}

/// One path per non-blank line, trimmed.
pub fn parse_file_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Files added, copied, modified or renamed in the index.
pub fn staged_files(executor: &dyn Executor, source: &SourceTree) -> Result<Vec<String>> {
    run_git(
        executor,
        source,
        &["git", "diff", "--cached", "--name-only", "--diff-filter=ACMR"],
    )
}

/// Files touched by the commit before `HEAD`.
pub fn previous_commit_files(executor: &dyn Executor, source: &SourceTree) -> Result<Vec<String>> {
    run_git(
        executor,
        source,
        &["git", "diff-tree", "--no-commit-id", "--name-only", "-r", "HEAD~1"],
    )
}

/// Files changed in `range` (anything `git diff` accepts, e.g. `main..HEAD`).
pub fn files_between_commits(
    executor: &dyn Executor,
    source: &SourceTree,
    range: &str,
) -> Result<Vec<String>> {
    run_git(executor, source, &["git", "diff", "--name-only", range])
}

/// [`files_between_commits`] for several ranges at once. Lookups run
/// concurrently; results come back in the order of `ranges`. Any failure
/// fails the whole call.
pub fn files_between_ranges(
    executor: &dyn Executor,
    source: &SourceTree,
    ranges: &[String],
) -> Result<Vec<Vec<String>>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .iter()
            .map(|range| scope.spawn(move || files_between_commits(executor, source, range)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| ShipyardError::Engine("git diff worker panicked".into()))?
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RecordingExecutor, Response};

    fn repo() -> SourceTree {
        SourceTree::from_files([(".git/HEAD", "ref: refs/heads/main\n"), ("a.ts", "1")]).unwrap()
    }

    #[test]
    fn parse_drops_blank_lines() {
        assert_eq!(
            parse_file_list("src/a.ts\n\n  src/b.ts  \n\n"),
            vec!["src/a.ts", "src/b.ts"]
        );
        assert!(parse_file_list("").is_empty());
    }

    #[test]
    fn staged_files_runs_in_repo_mount() {
        let exec = RecordingExecutor::new()
            .respond(&["git", "diff", "--cached"], Response::ok("a.ts\nb.ts\n"));
        let files = staged_files(&exec, &repo()).unwrap();
        assert_eq!(files, vec!["a.ts", "b.ts"]);

        let execs = exec.execs();
        assert_eq!(execs[0].workdir, "/app");
        assert!(execs[0].workdir_files.contains(&".git/HEAD".to_string()));
        assert_eq!(
            execs[0].command(),
            "git diff --cached --name-only --diff-filter=ACMR"
        );
    }

    #[test]
    fn previous_commit_uses_diff_tree() {
        let exec = RecordingExecutor::new()
            .respond(&["git", "diff-tree"], Response::ok("README.md\n"));
        assert_eq!(previous_commit_files(&exec, &repo()).unwrap(), vec!["README.md"]);
        assert_eq!(
            exec.execs()[0].command(),
            "git diff-tree --no-commit-id --name-only -r 'HEAD~1'"
        );
    }

    #[test]
    fn ranges_keep_input_order() {
        let exec = RecordingExecutor::new()
            .respond(&["git", "diff", "--name-only", "a..b"], Response::ok("one\n"))
            .respond(&["git", "diff", "--name-only", "b..c"], Response::ok("two\nthree\n"))
            .respond(&["git", "diff", "--name-only", "c..d"], Response::ok(""));
        let ranges: Vec<String> = ["c..d", "a..b", "b..c"].iter().map(|s| s.to_string()).collect();
        let out = files_between_ranges(&exec, &repo(), &ranges).unwrap();
        assert_eq!(
            out,
            vec![vec![], vec!["one".to_string()], vec!["two".into(), "three".into()]]
        );
        assert_eq!(exec.runs().len(), 3);
    }

    #[test]
    fn one_failing_range_fails_all() {
        let exec = RecordingExecutor::new().respond(
            &["git", "diff", "--name-only", "bad..ref"],
            Response::fail(128, "fatal: bad revision"),
        );
        let ranges = vec!["a..b".to_string(), "bad..ref".to_string()];
        let err = files_between_ranges(&exec, &repo(), &ranges).unwrap_err();
        assert!(matches!(err, ShipyardError::CommandFailed { exit_code: 128, .. }));
    }
}
