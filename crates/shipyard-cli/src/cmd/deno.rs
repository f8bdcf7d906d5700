use super::Context;
use crate::output::print_json;
use anyhow::Context as _;
use clap::Subcommand;
use shipyard_core::deno::{self, DenoDeployOptions, TOKEN_ENV};
use shipyard_core::Secret;

#[derive(Subcommand)]
pub enum DenoSubcommand {
    /// Deploy the project with deployctl
    Deploy {
        /// Deno Deploy project (overrides config)
        #[arg(long)]
        project: Option<String>,
        /// Organization (overrides config)
        #[arg(long)]
        org: Option<String>,
        /// Entrypoint module (overrides config)
        #[arg(long)]
        entrypoint: Option<String>,
        /// Production deploy instead of a preview
        #[arg(long)]
        prod: bool,
        /// `deno task` to run before deploying (overrides config)
        #[arg(long)]
        build_task: Option<String>,
        /// Paths to upload, comma separated (overrides config)
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        /// Deploy token as env:NAME or file:PATH
        #[arg(long, value_name = "SOURCE", default_value = "env:DENO_DEPLOY_TOKEN")]
        token: String,
    },
}

pub fn run(ctx: &Context, subcmd: DenoSubcommand) -> anyhow::Result<()> {
    match subcmd {
        DenoSubcommand::Deploy {
            project,
            org,
            entrypoint,
            prod,
            build_task,
            include,
            token,
        } => {
            let cfg = &ctx.config.deno;
            let required = |flag: &str, value: Option<String>, fallback: &Option<String>| {
                value
                    .or_else(|| fallback.clone())
                    .with_context(|| format!("--{flag} is required (or set deno.{flag} in shipyard.yaml)"))
            };
            let mut opts = DenoDeployOptions::new(
                required("project", project, &cfg.project)?,
                required("org", org, &cfg.org)?,
                required("entrypoint", entrypoint, &cfg.entrypoint)?,
            );
            opts.prod = prod;
            opts.build_task = build_task.or_else(|| cfg.build_task.clone());
            opts.include = if include.is_empty() {
                cfg.include.clone()
            } else {
                include
            };
            let token = Secret::parse(TOKEN_ENV, &token).context("invalid --token")?;
            deploy(ctx, &token, &opts)
        }
    }
}

fn deploy(ctx: &Context, token: &Secret, opts: &DenoDeployOptions) -> anyhow::Result<()> {
    let source = ctx.source_tree(false)?;
    let runner = ctx.runner()?;
    let output = deno::deno_deploy(&runner, &source, token, opts)
        .with_context(|| format!("deno deploy of '{}' failed", opts.project))?;

    if runner.is_dry_run() {
        return runner.report(ctx.json);
    }
    if ctx.json {
        print_json(&serde_json::json!({
            "project": opts.project,
            "prod": opts.prod,
            "output": output,
        }))
    } else {
        print!("{output}");
        Ok(())
    }
}
