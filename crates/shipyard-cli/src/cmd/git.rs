use super::Context;
use crate::output::{print_json, print_lines};
use anyhow::Context as _;
use clap::Subcommand;
use shipyard_core::git_diff;

#[derive(Subcommand)]
pub enum GitSubcommand {
    /// Files added, copied, modified or renamed in the index
    Staged,

    /// Files changed by the previous commit
    Previous,

    /// Files changed in one or more commit ranges
    Between {
        /// Ranges such as `main..HEAD`; several are looked up concurrently
        #[arg(required = true)]
        ranges: Vec<String>,
    },
}

pub fn run(ctx: &Context, subcmd: GitSubcommand) -> anyhow::Result<()> {
    let source = ctx.source_tree(true)?;
    let runner = ctx.runner()?;

    match subcmd {
        GitSubcommand::Staged => {
            let files = git_diff::staged_files(&runner, &source).context("git diff --cached failed")?;
            if runner.is_dry_run() {
                return runner.report(ctx.json);
            }
            print_files(ctx, &files)
        }
        GitSubcommand::Previous => {
            let files = git_diff::previous_commit_files(&runner, &source)
                .context("git diff-tree failed")?;
            if runner.is_dry_run() {
                return runner.report(ctx.json);
            }
            print_files(ctx, &files)
        }
        GitSubcommand::Between { ranges } => {
            let per_range = git_diff::files_between_ranges(&runner, &source, &ranges)
                .context("git diff failed")?;
            if runner.is_dry_run() {
                return runner.report(ctx.json);
            }
            if ctx.json {
                let value: Vec<_> = ranges
                    .iter()
                    .zip(&per_range)
                    .map(|(range, files)| serde_json::json!({ "range": range, "files": files }))
                    .collect();
                return print_json(&value);
            }
            if let [files] = per_range.as_slice() {
                print_lines(files);
                return Ok(());
            }
            for (range, files) in ranges.iter().zip(&per_range) {
                println!("# {range}");
                print_lines(files);
            }
            Ok(())
        }
    }
}

fn print_files(ctx: &Context, files: &[String]) -> anyhow::Result<()> {
    if ctx.json {
        print_json(&files)
    } else {
        print_lines(files);
        Ok(())
    }
}
