use anyhow::Result;
use clap::Args;

use spack_cm::settings::Settings;
use spack_cm::setup::setup_spaces;
use spack_cm::workspace::Workspace;

#[derive(Debug, Args)]
pub(crate) struct SetupArgs {
    /// Project name.
    #[arg(short, long)]
    project: String,

    /// Machine name (defaults to the host name).
    #[arg(short, long)]
    machine: Option<String>,

    /// Spack branch or tag to check out.
    #[arg(long = "spack")]
    spack_branch: Option<String>,
}

pub(crate) fn setup(workspace: &Workspace, settings: &Settings, args: &SetupArgs) -> Result<()> {
    let machine = super::machine_or_hostname(args.machine.as_deref())?;
    let spack = super::prepare_spack(settings, args.spack_branch.as_deref())?;
    setup_spaces(&spack, workspace, &args.project, &machine)?;
    Ok(())
}
