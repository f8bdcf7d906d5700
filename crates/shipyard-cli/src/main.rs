mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, deno::DenoSubcommand, firebase::FirebaseSubcommand,
    git::GitSubcommand, Context,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Containerized CI/CD steps: npm install, .env synthesis, build and deploy to Firebase or Deno Deploy",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from shipyard.yaml or .git/)
    #[arg(long, global = true, env = "SHIPYARD_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: <root>/shipyard.yaml)
    #[arg(long, global = true, env = "SHIPYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Print the container plan instead of running it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Container engine binary (overrides config)
    #[arg(long, global = true, env = "SHIPYARD_ENGINE")]
    engine: Option<String>,

    /// Log pipeline progress
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, build and deploy Firebase projects
    Firebase {
        #[command(subcommand)]
        subcommand: FirebaseSubcommand,
    },

    /// List changed files from git
    Git {
        #[command(subcommand)]
        subcommand: GitSubcommand,
    },

    /// Deploy to Deno Deploy
    Deno {
        #[command(subcommand)]
        subcommand: DenoSubcommand,
    },

    /// Show, create or validate shipyard.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = Context::load(
        root,
        cli.config.as_deref(),
        cli.json,
        cli.dry_run,
        cli.engine,
    )
    .and_then(|ctx| match cli.command {
        Commands::Firebase { subcommand } => cmd::firebase::run(&ctx, subcommand),
        Commands::Git { subcommand } => cmd::git::run(&ctx, subcommand),
        Commands::Deno { subcommand } => cmd::deno::run(&ctx, subcommand),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
