//! Shell script that activates the installed lmod and the generated module tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::io::write_atomic;
use crate::workspace::Workspace;

/// Directory holding lmod's shell init files (`bash`, `csh`, ...).
///
/// Prefers a directory named `init`; falls back to the first directory with a
/// `bash` file, in sorted walk order.
pub fn find_lmod_init(lmod_install: &Path) -> Option<PathBuf> {
    let mut fallback = None;
    for entry in WalkDir::new(lmod_install)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() || entry.file_name() != "bash" {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        if dir.file_name().is_some_and(|name| name == "init") {
            return Some(dir.to_path_buf());
        }
        fallback.get_or_insert_with(|| dir.to_path_buf());
    }
    fallback
}

/// The `Core` directory of the lmod hierarchy under the modulefile root.
pub fn find_core_modules(modulefiles: &Path) -> PathBuf {
    WalkDir::new(modulefiles)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_dir() && entry.file_name() == "Core")
        .map(|entry| entry.into_path())
        .unwrap_or_else(|| modulefiles.join("Core"))
}

pub fn script_path(workspace: &Workspace, project: &str, machine: &str) -> PathBuf {
    workspace
        .project_dir(project)
        .join("module-init-scripts")
        .join(format!("{}-modules-{}-init.sh", project, machine))
}

pub fn render_script(init_dir: &Path, core_modules: &Path) -> String {
    format!(
        "#!/bin/bash\n\
         #unset MODULEPATH\n\
         source {init}/bash\n\
         #source {init}/csh\n\
         module use {core}\n",
        init = init_dir.display(),
        core = core_modules.display()
    )
}

/// Write the init script, or warn and return `None` when lmod is not installed
/// under `lmod_install` (e.g. after a dry run).
pub fn write_module_init(
    workspace: &Workspace,
    project: &str,
    machine: &str,
    lmod_install: &Path,
    modulefiles: &Path,
) -> Result<Option<PathBuf>> {
    let Some(init_dir) = find_lmod_init(lmod_install) else {
        warn!(
            "no lmod init files under {}; skipping module init script",
            lmod_install.display()
        );
        return Ok(None);
    };
    let core = find_core_modules(modulefiles);
    let path = script_path(workspace, project, machine);
    write_atomic(&path, render_script(&init_dir, &core).as_bytes())
        .with_context(|| format!("writing module init script '{}'", path.display()))?;
    set_executable(&path)?;
    info!("module init script written to {}", path.display());
    Ok(Some(path))
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("setting permissions on '{}'", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
