use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use spack_cm::config::Config;
use spack_cm::error::ConfigError;
use spack_cm::install::{InstallOptions, Installer};
use spack_cm::phase::Stage;
use spack_cm::preflight;
use spack_cm::settings::Settings;
use spack_cm::spack::{InstallFlags, PackageManager};
use spack_cm::workspace::{InstallPaths, PathOptions, Workspace};

#[derive(Debug, Args)]
pub(crate) struct InstallArgs {
    /// Project name.
    #[arg(short, long)]
    project: String,

    /// Machine name (defaults to the host name).
    #[arg(short, long)]
    machine: Option<String>,

    /// Root for `install/` and `modulefiles/`.
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Install only one stage.
    #[arg(short, long, value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// Spack branch or tag to check out.
    #[arg(long = "spack")]
    spack_branch: Option<String>,

    /// Install bzip2, curl and patch with Spack and put them on PATH.
    #[arg(long)]
    install_spack_deps: bool,

    /// Verbose Spack installs.
    #[arg(short, long)]
    debug: bool,

    /// Let Spack find external packages before every attempt.
    #[arg(short, long)]
    external: bool,

    /// Do not prefix module names with the project.
    #[arg(long)]
    no_project_modules: bool,

    /// Insert the machine name into install and modulefile paths.
    #[arg(long)]
    add_machine_to_install_path: bool,

    /// Only generate single compiler x MPI x CUDA documents.
    #[arg(long)]
    generate_single_stacks: bool,

    #[arg(long)]
    explicit_install_path: Option<PathBuf>,

    #[arg(long)]
    explicit_modulefile_path: Option<PathBuf>,

    /// Run `spack install --fake`.
    #[arg(long)]
    dry_run: bool,
}

pub(crate) fn install(workspace: &Workspace, settings: &Settings, args: &InstallArgs) -> Result<()> {
    let machine = super::machine_or_hostname(args.machine.as_deref())?;
    let spack = super::prepare_spack(settings, args.spack_branch.as_deref())?;
    if args.install_spack_deps {
        let bins = preflight::ensure_spack_dependencies(&spack)?;
        let path = preflight::prepend_to_path(&bins, env::var_os("PATH"))?;
        env::set_var("PATH", path);
    }

    workspace.require_spaces(&args.project, &machine)?;

    let root = match &args.root {
        Some(root) => {
            if !root.is_dir() {
                bail!(ConfigError::InvalidRoot(root.clone()));
            }
            Some(
                root.canonicalize()
                    .with_context(|| format!("canonicalizing '{}'", root.display()))?,
            )
        }
        None => None,
    };
    let paths = InstallPaths::resolve(
        &args.project,
        &machine,
        &PathOptions {
            root,
            machine_in_path: args.add_machine_to_install_path,
            explicit_install: args.explicit_install_path.clone(),
            explicit_modulefiles: args.explicit_modulefile_path.clone(),
        },
    )?;
    info!("installing into {}", paths.install.display());
    info!("module files in {}", paths.modulefiles.display());

    let system_compiler = spack.detect_system_compiler()?;
    info!("system compiler {}", system_compiler);
    let config = Config::load(
        workspace,
        &args.project,
        &machine,
        paths,
        &system_compiler,
        !args.no_project_modules,
    )?;

    let options = InstallOptions {
        stage: args.stage,
        flags: InstallFlags {
            verbose: args.debug,
            fake: args.dry_run,
        },
        external: args.external,
        stacks_only: args.generate_single_stacks,
    };
    let record = Installer::new(&spack, workspace, &config, settings.attempts, options).run()?;
    info!(
        "run {} finished with {} phase(s) recorded",
        record.run_id,
        record.phases.len()
    );
    Ok(())
}
