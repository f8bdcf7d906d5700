use super::Context;
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use shipyard_core::config::{Config, WarnLevel};
use shipyard_core::paths;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Write a default shipyard.yaml if none exists
    Init,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(ctx: &Context, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Init => init(ctx),
        ConfigSubcommand::Validate => validate(ctx),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(ctx: &Context) -> anyhow::Result<()> {
    let cfg = &ctx.config;
    if ctx.json {
        return print_json(cfg);
    }
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let fb = &cfg.firebase;
    let rows = vec![
        vec!["image".to_string(), cfg.image.clone()],
        vec!["global_tools".to_string(), cfg.global_tools.join(", ")],
        vec!["engine".to_string(), cfg.engine.clone()],
        vec!["firebase.frontend_dir".to_string(), opt(&fb.frontend_dir)],
        vec!["firebase.backend_dir".to_string(), opt(&fb.backend_dir)],
        vec!["firebase.firebase_dir".to_string(), opt(&fb.firebase_dir)],
        vec!["firebase.app_id".to_string(), opt(&fb.app_id)],
        vec!["firebase.only".to_string(), opt(&fb.only)],
        vec!["firebase.access_token_env".to_string(), fb.access_token_env.clone()],
        vec!["firebase.projects.development".to_string(), fb.projects.development.clone()],
        vec!["firebase.projects.staging".to_string(), fb.projects.staging.clone()],
        vec!["firebase.projects.production".to_string(), fb.projects.production.clone()],
        vec!["deno.project".to_string(), opt(&cfg.deno.project)],
        vec!["deno.org".to_string(), opt(&cfg.deno.org)],
        vec!["deno.entrypoint".to_string(), opt(&cfg.deno.entrypoint)],
    ];
    print_table(&["KEY", "VALUE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(ctx: &Context) -> anyhow::Result<()> {
    let written = Config::init(&ctx.root).context("failed to write config")?;
    let path = paths::config_path(&ctx.root);
    if ctx.json {
        return print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "created": written,
        }));
    }
    if written {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists", path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ctx: &Context) -> anyhow::Result<()> {
    let warnings = ctx.config.validate();

    if ctx.json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
