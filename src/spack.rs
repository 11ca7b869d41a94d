//! Spack binary resolution and execution.
//!
//! Resolution order:
//! 1. `SPACK_BIN` env var (path to `bin/spack`)
//! 2. System PATH (`which spack`)
//!
//! The Spack root is `SPACK_ROOT` when set, otherwise two levels above the
//! binary.
//!
//! Everything the installer asks of Spack goes through [`PackageManager`], so
//! the retry and registry logic can run against a scripted implementation.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::{InstallError, SetupError};
use crate::io::remove_path;

/// Result of a Spack command that is allowed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure { code: Option<i32> },
}

impl ExitOutcome {
    pub fn is_success(self) -> bool {
        self == ExitOutcome::Success
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failure {
                code: status.code(),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallFlags {
    /// `spack install -v`
    pub verbose: bool,
    /// `spack install --fake`
    pub fake: bool,
}

pub trait PackageManager {
    /// Root of the Spack checkout.
    fn root(&self) -> &Path;

    /// Drop user-scope configuration (`~/.spack`).
    fn reset_user_scope(&self) -> Result<()>;

    fn clean(&self) -> Result<()>;

    fn find_compilers(&self) -> Result<()>;

    fn find_externals(&self) -> Result<()>;

    /// Install the environment rooted at `env_dir`.
    fn install(&self, env_dir: &Path, flags: InstallFlags) -> Result<ExitOutcome>;

    /// Regenerate lmod module files for the environment.
    fn refresh_modules(&self, env_dir: &Path) -> Result<ExitOutcome>;

    /// Add an installed compiler to the environment's compiler list.
    fn register_compiler(&self, env_dir: &Path, spec: &str) -> Result<()>;

    /// Spec of the first compiler Spack finds on a clean user scope.
    fn detect_system_compiler(&self) -> Result<String>;

    /// `spack repo create <dir> <namespace>`
    fn create_repo(&self, repo_dir: &Path, namespace: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Spack {
    bin: PathBuf,
    root: PathBuf,
    user_scope: PathBuf,
}

impl Spack {
    /// Find the Spack binary using the resolution order.
    pub fn locate() -> Result<Self> {
        let bin = match env::var_os("SPACK_BIN") {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    bail!(SetupError::InvalidSpackBin(path));
                }
                path
            }
            None => which::which("spack").map_err(|_| anyhow!(SetupError::SpackNotFound))?,
        };

        let root = match env::var_os("SPACK_ROOT") {
            Some(root) => PathBuf::from(root),
            None => bin
                .parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    anyhow!("cannot derive spack root from '{}'", bin.display())
                })?,
        };

        let home = dirs::home_dir().context("cannot determine home directory")?;
        info!("using spack at {} (root {})", bin.display(), root.display());
        Ok(Self {
            bin,
            root,
            user_scope: home.join(".spack"),
        })
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn in_env(&self, env_dir: &Path) -> Command {
        let mut cmd = self.command();
        cmd.arg("-e").arg(env_dir);
        cmd
    }

    fn status(&self, mut cmd: Command) -> Result<ExitOutcome> {
        debug!("running {:?}", cmd);
        let status = cmd
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute {}", self.bin.display()))?;
        Ok(status.into())
    }

    fn run_checked(&self, cmd: Command, what: &str) -> Result<()> {
        match self.status(cmd)? {
            ExitOutcome::Success => Ok(()),
            ExitOutcome::Failure { code } => bail!(
                "spack {} failed with exit code: {}",
                what,
                code.unwrap_or(-1)
            ),
        }
    }

    fn output(&self, mut cmd: Command) -> Result<(ExitOutcome, String)> {
        debug!("running {:?}", cmd);
        let output = cmd
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("failed to execute {}", self.bin.display()))?;
        Ok((
            output.status.into(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }

    /// Install prefixes of `package` and its dependencies (`spack find -p -d`),
    /// or `None` when Spack does not know the package.
    pub fn find_prefixes(&self, package: &str) -> Result<Option<Vec<PathBuf>>> {
        let mut cmd = self.command();
        cmd.args(["find", "-p", "-d", package]);
        let (outcome, stdout) = self.output(cmd)?;
        if !outcome.is_success() {
            return Ok(None);
        }
        Ok(Some(parse_prefixes(&stdout)))
    }

    /// Install a single spec into the Spack root (outside any environment).
    pub fn install_spec(&self, spec: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["install", spec]);
        self.run_checked(cmd, &format!("install {}", spec))
    }
}

impl PackageManager for Spack {
    fn root(&self) -> &Path {
        &self.root
    }

    fn reset_user_scope(&self) -> Result<()> {
        if remove_path(&self.user_scope)? {
            debug!("removed {}", self.user_scope.display());
        }
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("clean");
        self.run_checked(cmd, "clean")
    }

    fn find_compilers(&self) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["compiler", "find"]);
        self.run_checked(cmd, "compiler find")
    }

    fn find_externals(&self) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["external", "find"]);
        self.run_checked(cmd, "external find")
    }

    fn install(&self, env_dir: &Path, flags: InstallFlags) -> Result<ExitOutcome> {
        let mut cmd = self.in_env(env_dir);
        cmd.arg("install");
        if flags.verbose {
            cmd.arg("-v");
        }
        if flags.fake {
            cmd.arg("--fake");
        }
        self.status(cmd)
    }

    fn refresh_modules(&self, env_dir: &Path) -> Result<ExitOutcome> {
        let mut cmd = self.in_env(env_dir);
        cmd.args(["module", "lmod", "refresh", "-y"]);
        self.status(cmd)
    }

    fn register_compiler(&self, env_dir: &Path, spec: &str) -> Result<()> {
        let mut locate = self.in_env(env_dir);
        locate.args(["location", "-i", spec]);
        let (outcome, stdout) = self.output(locate)?;
        let prefix = stdout.trim();
        if !outcome.is_success() || prefix.is_empty() {
            bail!(InstallError::CompilerRegistration(spec.to_string()));
        }

        let mut find = self.in_env(env_dir);
        find.args(["compiler", "find"]).arg(OsStr::new(prefix));
        self.run_checked(find, &format!("compiler find {}", prefix))
            .context(InstallError::CompilerRegistration(spec.to_string()))
    }

    fn detect_system_compiler(&self) -> Result<String> {
        self.reset_user_scope()?;
        self.find_compilers()?;
        first_compiler_spec(&self.user_scope).context(SetupError::SystemCompiler)
    }

    fn create_repo(&self, repo_dir: &Path, namespace: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["repo", "create"]).arg(repo_dir).arg(namespace);
        self.run_checked(cmd, "repo create")
    }
}

/// Absolute paths in `spack find -p` output, in output order.
fn parse_prefixes(stdout: &str) -> Vec<PathBuf> {
    stdout
        .split_whitespace()
        .filter(|item| item.starts_with('/') && *item != "/")
        .map(PathBuf::from)
        .collect()
}

/// Read `compilers[0].compiler.spec` from the platform subdirectory of the
/// user scope that `spack compiler find` just populated.
pub fn first_compiler_spec(user_scope: &Path) -> Result<String> {
    let entries = fs::read_dir(user_scope)
        .with_context(|| format!("reading user scope '{}'", user_scope.display()))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("iterating user scope '{}'", user_scope.display()))?;
        let path = entry.path();
        if path.is_dir() && entry.file_name() != "cache" {
            candidates.push(path.join("compilers.yaml"));
        }
    }
    candidates.sort();

    for path in candidates.iter().filter(|p| p.is_file()) {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading '{}'", path.display()))?;
        let doc: Value = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing '{}'", path.display()))?;
        if let Some(spec) = doc["compilers"][0]["compiler"]["spec"].as_str() {
            return Ok(spec.to_string());
        }
    }
    bail!(
        "no compiler found in any compilers.yaml under '{}'",
        user_scope.display()
    )
}
