use super::{secret_arg, Context};
use crate::output::print_json;
use anyhow::Context as _;
use clap::{Args, Subcommand};
use shipyard_core::config::EnvironmentProjects;
use shipyard_core::deploy::DeployTarget;
use shipyard_core::env_file::{self, EnvInputs};
use shipyard_core::io;
use shipyard_core::paths::{self, DOTENV};
use shipyard_core::pipeline::{select_deploy_target, DeployOptions, Pipeline, ProjectDirs};
use shipyard_core::{Secret, ShipyardError};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum FirebaseSubcommand {
    /// Install, write .env, build and deploy to one project
    Deploy {
        /// Firebase project id
        #[arg(long)]
        project: String,
        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Pick the project from CI event data, then deploy
    DeployEnv {
        /// CI event name (push, pull_request, ...)
        #[arg(long, env = "GITHUB_EVENT_NAME")]
        event: String,
        /// Git ref that triggered the event
        #[arg(long = "ref", env = "GITHUB_REF", default_value = "")]
        git_ref: String,
        /// Project for pull requests and other events (overrides config)
        #[arg(long)]
        development: Option<String>,
        /// Project for branch pushes (overrides config)
        #[arg(long)]
        staging: Option<String>,
        /// Project for `refs/tags/v*` pushes (overrides config)
        #[arg(long)]
        production: Option<String>,
        #[command(flatten)]
        deploy: DeployArgs,
    },

    /// Install dependencies and run `npm run lint --if-present`
    Lint {
        #[command(flatten)]
        dirs: DirArgs,
    },

    /// Print (or write) the .env the pipeline would synthesize
    Env {
        /// Firebase project id
        #[arg(long)]
        project: String,
        /// Firebase web app id
        #[arg(long)]
        app_id: Option<String>,
        /// Web app config as env:NAME or file:PATH
        #[arg(long, value_name = "SOURCE")]
        webapp_config: Option<String>,
        /// Extra dotenv lines as env:NAME or file:PATH
        #[arg(long, value_name = "SOURCE")]
        extra_env: Option<String>,
        /// Frontend directory (overrides config)
        #[arg(long)]
        frontend_dir: Option<String>,
        /// Write <frontend-dir>/.env and add it to .gitignore
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
pub struct DirArgs {
    /// Frontend directory (overrides config)
    #[arg(long)]
    frontend_dir: Option<String>,
    /// Backend directory (overrides config)
    #[arg(long)]
    backend_dir: Option<String>,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Service-account JSON or access token, as env:NAME or file:PATH
    #[arg(long, value_name = "SOURCE")]
    credential: String,
    /// Firebase web app id (overrides config)
    #[arg(long)]
    app_id: Option<String>,
    /// Deploy filter, e.g. hosting or functions (overrides config)
    #[arg(long)]
    only: Option<String>,
    /// Web app config as env:NAME or file:PATH
    #[arg(long, value_name = "SOURCE")]
    webapp_config: Option<String>,
    /// Extra dotenv lines as env:NAME or file:PATH
    #[arg(long, value_name = "SOURCE")]
    extra_env: Option<String>,
    #[command(flatten)]
    dirs: DirArgs,
    /// Directory holding firebase.json (overrides config)
    #[arg(long)]
    firebase_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: FirebaseSubcommand) -> anyhow::Result<()> {
    match subcmd {
        FirebaseSubcommand::Deploy { project, deploy } => deploy_project(ctx, project, deploy),
        FirebaseSubcommand::DeployEnv {
            event,
            git_ref,
            development,
            staging,
            production,
            deploy,
        } => {
            let defaults = &ctx.config.firebase.projects;
            let projects = EnvironmentProjects {
                development: development.unwrap_or_else(|| defaults.development.clone()),
                staging: staging.unwrap_or_else(|| defaults.staging.clone()),
                production: production.unwrap_or_else(|| defaults.production.clone()),
            };
            deploy_env(ctx, &event, &git_ref, &projects, deploy)
        }
        FirebaseSubcommand::Lint { dirs } => lint(ctx, dirs),
        FirebaseSubcommand::Env {
            project,
            app_id,
            webapp_config,
            extra_env,
            frontend_dir,
            write,
        } => env(
            ctx,
            &project,
            app_id.or_else(|| ctx.config.firebase.app_id.clone()),
            webapp_config.as_deref(),
            extra_env.as_deref(),
            frontend_dir.or_else(|| ctx.config.firebase.frontend_dir.clone()),
            write,
        ),
    }
}

fn pipeline(ctx: &Context) -> anyhow::Result<Pipeline<super::Runner>> {
    Ok(Pipeline::new(ctx.runner()?)
        .with_base(ctx.config.base_environment())
        .with_access_token_env(ctx.config.firebase.access_token_env.clone()))
}

fn project_dirs(ctx: &Context, dirs: DirArgs, firebase_dir: Option<String>) -> ProjectDirs {
    let cfg = &ctx.config.firebase;
    ProjectDirs {
        frontend_dir: dirs.frontend_dir.or_else(|| cfg.frontend_dir.clone()),
        backend_dir: dirs.backend_dir.or_else(|| cfg.backend_dir.clone()),
        firebase_dir: firebase_dir.or_else(|| cfg.firebase_dir.clone()),
    }
}

fn deploy_options(ctx: &Context, project_id: String, args: DeployArgs) -> anyhow::Result<DeployOptions> {
    let credential = Secret::parse("credential", &args.credential).context("invalid --credential")?;
    Ok(DeployOptions {
        target: DeployTarget {
            project_id,
            only: args.only.or_else(|| ctx.config.firebase.only.clone()),
        },
        credential,
        app_id: args.app_id.or_else(|| ctx.config.firebase.app_id.clone()),
        webapp_config: secret_arg("webapp-config", args.webapp_config.as_deref())?,
        extra_env: secret_arg("extra-env", args.extra_env.as_deref())?,
        dirs: project_dirs(ctx, args.dirs, args.firebase_dir),
    })
}

fn report_deploy(ctx: &Context, runner: &super::Runner, target: &DeployTarget, output: &str) -> anyhow::Result<()> {
    if runner.is_dry_run() {
        return runner.report(ctx.json);
    }
    if ctx.json {
        print_json(&serde_json::json!({
            "project": target.project_id,
            "only": target.only,
            "output": output,
        }))
    } else {
        print!("{output}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// deploy / deploy-env
// ---------------------------------------------------------------------------

fn deploy_project(ctx: &Context, project: String, args: DeployArgs) -> anyhow::Result<()> {
    let opts = deploy_options(ctx, project, args)?;
    let source = ctx.source_tree(false)?;
    let pipeline = pipeline(ctx)?;
    let output = pipeline
        .firebase_deploy(&source, &opts)
        .with_context(|| format!("deploy to '{}' failed", opts.target.project_id))?;
    report_deploy(ctx, pipeline.executor(), &opts.target, &output)
}

fn deploy_env(
    ctx: &Context,
    event: &str,
    git_ref: &str,
    projects: &EnvironmentProjects,
    args: DeployArgs,
) -> anyhow::Result<()> {
    let opts = deploy_options(ctx, String::new(), args)?;
    let (environment, target) =
        select_deploy_target(event, git_ref, projects, opts.target.only.as_deref());
    let source = ctx.source_tree(false)?;
    let pipeline = pipeline(ctx)?;
    let output = match pipeline.deploy_to_env(&source, event, git_ref, projects, opts) {
        Ok(output) => output,
        Err(ShipyardError::MissingProject(env)) => anyhow::bail!(
            "no project configured for {env}; set firebase.projects.{env} or pass --{env}"
        ),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("deploy to {environment} ('{}') failed", target.project_id)))
        }
    };
    report_deploy(ctx, pipeline.executor(), &target, &output)
}

// ---------------------------------------------------------------------------
// lint
// ---------------------------------------------------------------------------

fn lint(ctx: &Context, dirs: DirArgs) -> anyhow::Result<()> {
    let dirs = project_dirs(ctx, dirs, None);
    if dirs.frontend_dir.is_none() && dirs.backend_dir.is_none() {
        anyhow::bail!("nothing to lint: pass --frontend-dir/--backend-dir or set them in shipyard.yaml");
    }
    let source = ctx.source_tree(false)?;
    let pipeline = pipeline(ctx)?;
    pipeline
        .lint(&source, dirs.frontend_dir.as_deref(), dirs.backend_dir.as_deref())
        .context("lint failed")?;

    let runner = pipeline.executor();
    if runner.is_dry_run() {
        return runner.report(ctx.json);
    }
    if ctx.json {
        print_json(&serde_json::json!({ "lint": "ok" }))
    } else {
        println!("Lint passed.");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// env
// ---------------------------------------------------------------------------

fn env(
    ctx: &Context,
    project: &str,
    app_id: Option<String>,
    webapp_config: Option<&str>,
    extra_env: Option<&str>,
    frontend_dir: Option<String>,
    write: bool,
) -> anyhow::Result<()> {
    let frontend = frontend_dir
        .as_deref()
        .map(paths::normalize)
        .transpose()
        .context("invalid --frontend-dir")?;
    let env_rel = frontend.as_deref().map(|dir| paths::join(dir, DOTENV));
    let env_path = env_rel.as_ref().map(|rel| ctx.root.join(rel));

    let existing = env_path
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok());
    let webapp_config = secret_arg("webapp-config", webapp_config)?;
    let extra_env = secret_arg("extra-env", extra_env)?;
    let webapp_text = webapp_config.as_ref().map(Secret::plaintext).transpose()?;
    let extra_text = extra_env.as_ref().map(Secret::plaintext).transpose()?;

    let content = env_file::render_env_file(&EnvInputs {
        existing: existing.as_deref(),
        project_id: project,
        app_id: app_id.as_deref(),
        webapp_config: webapp_text,
        extra_env: extra_text,
    })
    .context("failed to render .env")?;

    if write {
        let (Some(rel), Some(path)) = (env_rel, env_path) else {
            anyhow::bail!("--write needs a frontend directory");
        };
        io::atomic_write(&path, content.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        io::ensure_gitignore_entry(&ctx.root, &rel)?;
        if ctx.json {
            print_json(&serde_json::json!({ "path": rel, "content": content }))?;
        } else {
            println!("Wrote {rel}");
        }
        return Ok(());
    }

    if ctx.json {
        print_json(&serde_json::json!({ "path": env_rel, "content": content }))
    } else {
        print!("{content}");
        Ok(())
    }
}
