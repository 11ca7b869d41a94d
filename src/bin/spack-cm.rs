use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use spack_cm::settings::{load_settings, resolve_log_file};
use spack_cm::workspace::Workspace;

mod commands;

/// Build a Spack software stack from a project manifest.
#[derive(Debug, Parser)]
#[command(name = "spack-cm", version, about)]
struct Cli {
    /// Tool home holding `project/` and `platform/`.
    #[arg(long, global = true, env = "SPACK_CM_HOME")]
    home: Option<PathBuf>,

    /// Log file (truncated on every run).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create project and platform spaces.
    Setup(commands::SetupArgs),
    /// Generate environment documents and install the stack.
    Install(commands::InstallArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Setup(_) => "setup",
            Command::Install(_) => "install",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let workspace = Workspace::new(home);
    let settings = load_settings(&workspace.settings_path());
    let log_file = resolve_log_file(cli.log_file.as_deref(), settings.as_ref().ok());
    spack_cm::logging::init(&log_file)?;
    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            error!("{:#}", err);
            return Err(err);
        }
    };

    let name = cli.command.name();
    info!("START: {}", name);
    let result = match &cli.command {
        Command::Setup(args) => commands::setup(&workspace, &settings, args),
        Command::Install(args) => commands::install(&workspace, &settings, args),
    };
    match &result {
        Ok(()) => info!("END: {} complete", name),
        Err(err) => error!("END: {} failed: {:#}", name, err),
    }
    result
}
