mod install;
mod setup;

use std::ffi::OsString;

use anyhow::{bail, Context, Result};
use tracing::debug;

use spack_cm::preflight;
use spack_cm::settings::Settings;
use spack_cm::spack::{PackageManager, Spack};

pub(crate) use install::{install, InstallArgs};
pub(crate) use setup::{setup, SetupArgs};

/// Machine name: `--machine`, else the host name.
pub(crate) fn machine_or_hostname(machine: Option<&str>) -> Result<String> {
    if let Some(machine) = machine {
        return Ok(machine.to_string());
    }
    let raw = nix::unistd::gethostname().context("looking up host name; pass --machine")?;
    host_name(raw)
}

fn host_name(raw: OsString) -> Result<String> {
    let name = match raw.into_string() {
        Ok(name) => name,
        Err(raw) => bail!("host name {:?} is not valid UTF-8; pass --machine", raw),
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("host name is empty; pass --machine");
    }
    Ok(name.to_string())
}

/// Locate Spack and move it to the requested branch.
pub(crate) fn prepare_spack(settings: &Settings, branch: Option<&str>) -> Result<Spack> {
    let spack = Spack::locate()?;
    let branch = branch.unwrap_or(&settings.spack_branch);
    debug!("desired spack branch {}", branch);
    preflight::check_spack_branch(spack.root(), branch);
    Ok(spack)
}
