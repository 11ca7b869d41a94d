//! Tool home layout and install path resolution.
//!
//! ```text
//! <home>/
//!     project/<project>/            manifest, generated documents, active spack.yaml
//!     platform/<machine>/           machine packages/mirrors/compilers, licenses/
//!     spack-cm.toml                 optional settings
//! <root>/install/[<machine>/]<project>/{base-packages,lmod,compiler,utility,tpl}
//! <root>/modulefiles/[<machine>/]<project>/    lmod module root shared by all phases
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::error::{ConfigError, SetupError};

const ACTIVE_DOCUMENT: &str = "spack.yaml";

#[derive(Debug, Clone)]
pub struct Workspace {
    home: PathBuf,
}

impl Workspace {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.home.join("project").join(project)
    }

    pub fn platform_dir(&self, machine: &str) -> PathBuf {
        self.home.join("platform").join(machine)
    }

    pub fn manifest_path(&self, project: &str) -> PathBuf {
        self.project_dir(project)
            .join(format!("{}-manifest.yaml", project))
    }

    /// The document Spack treats as the project environment.
    pub fn active_document(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(ACTIVE_DOCUMENT)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.home.join("spack-cm.toml")
    }

    pub fn run_record_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("install-run.json")
    }

    /// Fail unless both spaces were created by `setup`.
    pub fn require_spaces(&self, project: &str, machine: &str) -> Result<()> {
        let project_dir = self.project_dir(project);
        if !project_dir.is_dir() {
            bail!(SetupError::MissingProject(project_dir));
        }
        let platform_dir = self.platform_dir(machine);
        if !platform_dir.is_dir() {
            bail!(SetupError::MissingPlatform(platform_dir));
        }
        Ok(())
    }
}

/// Inputs for [`InstallPaths::resolve`], straight from the CLI.
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub root: Option<PathBuf>,
    pub machine_in_path: bool,
    pub explicit_install: Option<PathBuf>,
    pub explicit_modulefiles: Option<PathBuf>,
}

/// Install and modulefile roots for one project on one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub install: PathBuf,
    pub modulefiles: PathBuf,
}

impl InstallPaths {
    pub fn resolve(project: &str, machine: &str, options: &PathOptions) -> Result<Self> {
        let suffix = if options.machine_in_path {
            Path::new(machine).join(project)
        } else {
            PathBuf::from(project)
        };

        let install = match (&options.explicit_install, &options.root) {
            (Some(path), _) => path.clone(),
            (None, Some(root)) => root.join("install").join(&suffix),
            (None, None) => bail!(ConfigError::MissingArgument("--root or --explicit-install-path")),
        };
        let modulefiles = match (&options.explicit_modulefiles, &options.root) {
            (Some(path), _) => path.clone(),
            (None, Some(root)) => root.join("modulefiles").join(&suffix),
            (None, None) => bail!(ConfigError::MissingArgument(
                "--root or --explicit-modulefile-path"
            )),
        };

        Ok(Self {
            install,
            modulefiles,
        })
    }

    pub fn base_packages(&self) -> PathBuf {
        self.install.join("base-packages")
    }

    pub fn lmod(&self) -> PathBuf {
        self.install.join("lmod")
    }

    pub fn compiler(&self) -> PathBuf {
        self.install.join("compiler")
    }

    pub fn utility(&self) -> PathBuf {
        self.install.join("utility")
    }

    pub fn tpl(&self) -> PathBuf {
        self.install.join("tpl")
    }
}
