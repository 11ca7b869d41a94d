//! Preflight checks run before `setup` and `install`.
//!
//! Validates that the host has the tools the workflow shells out to, keeps
//! the Spack checkout on the requested branch, and optionally bootstraps the
//! system packages Spack itself needs.
//!
//! # Example
//!
//! ```rust
//! use spack_cm::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("git") {
//!     println!("git not installed");
//! }
//!
//! let tools = &[("git", "git")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::spack::Spack;

/// Required host tools. Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("git", "git")];

/// Packages Spack needs from the host to fetch and patch sources.
pub const SPACK_DEPENDENCIES: &[&str] = &["bzip2", "curl", "patch"];

/// Check if a command exists on PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool and the package providing it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Branch or tag from the first line of `git status`
/// (`On branch develop`, `HEAD detached at v0.16.2`).
pub fn current_branch(status_stdout: &str) -> Option<&str> {
    status_stdout
        .lines()
        .next()?
        .split_whitespace()
        .last()
}

fn git(root: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(root).stdin(Stdio::null());
    cmd
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let status = git(root)
        .args(args)
        .status()
        .with_context(|| format!("running git {}", args.join(" ")))?;
    if !status.success() {
        bail!(
            "git {} failed with exit code: {}",
            args.join(" "),
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}

/// Move the Spack checkout at `root` to `desired` when it is on another branch.
///
/// Failures are logged as warnings; the run continues on whatever Spack is
/// checked out.
pub fn check_spack_branch(root: &Path, desired: &str) {
    if let Err(err) = align_branch(root, desired) {
        warn!("unable to move spack to '{}': {:#}", desired, err);
    }
}

fn align_branch(root: &Path, desired: &str) -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)?;
    let output = git(root)
        .arg("status")
        .output()
        .context("running git status")?;
    if !output.status.success() {
        bail!("'{}' is not a git checkout", root.display());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let current = current_branch(&stdout).unwrap_or_default();
    if current == desired {
        info!("spack is on '{}'", desired);
        return Ok(());
    }

    info!("spack is on '{}'; switching to '{}'", current, desired);
    run_git(root, &["fetch"])?;
    run_git(root, &["checkout", desired])?;
    run_git(root, &["pull", "origin", desired])?;
    info!("spack moved to '{}'", desired);
    Ok(())
}

/// Make sure Spack's own host dependencies are installed and return the
/// `bin` directories of every prefix found, in lookup order.
pub fn ensure_spack_dependencies(spack: &Spack) -> Result<Vec<PathBuf>> {
    let mut bins = Vec::new();
    for package in SPACK_DEPENDENCIES {
        let prefixes = match spack.find_prefixes(package)? {
            Some(prefixes) => prefixes,
            None => {
                info!("installing spack dependency {}", package);
                spack.install_spec(package)?;
                spack.find_prefixes(package)?.unwrap_or_default()
            }
        };
        for prefix in prefixes {
            let bin = prefix.join("bin");
            if !bins.contains(&bin) {
                bins.push(bin);
            }
        }
    }
    Ok(bins)
}

/// `dirs` followed by the entries of `current`, as a PATH value.
pub fn prepend_to_path(dirs: &[PathBuf], current: Option<OsString>) -> Result<OsString> {
    let existing: Vec<PathBuf> = current
        .as_deref()
        .map(|value| env::split_paths(value).collect())
        .unwrap_or_default();
    env::join_paths(dirs.iter().cloned().chain(existing)).context("building PATH")
}
