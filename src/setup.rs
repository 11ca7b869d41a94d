//! `setup`: create project and platform spaces from built-in templates.
//!
//! ```text
//! platform/<machine>/
//!     mirrors.yaml packages.yaml compilers.yaml licenses/license.lic
//! project/<project>/
//!     repos.yaml packages.yaml <project>-manifest.yaml <project>-repo/
//! ```
//!
//! Spaces that already exist are left untouched.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::error::SetupError;
use crate::manifest::KNOWN_KEYS;
use crate::spack::PackageManager;
use crate::workspace::Workspace;

const MIRRORS_TEMPLATE: &str = "mirrors: {}\n";
const PACKAGES_TEMPLATE: &str = "packages: {}\n";
const COMPILERS_TEMPLATE: &str = "compilers: []\n";
const LICENSE_TEMPLATE: &str = "";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub platform_created: bool,
    pub project_created: bool,
}

pub fn setup_spaces(
    pm: &dyn PackageManager,
    workspace: &Workspace,
    project: &str,
    machine: &str,
) -> Result<SetupReport> {
    let platform_dir = workspace.platform_dir(machine);
    let platform_created = if platform_dir.is_dir() {
        info!("platform space {} already exists", platform_dir.display());
        false
    } else {
        create_platform(&platform_dir).context(SetupError::Create {
            what: "platform space",
            path: platform_dir.clone(),
        })?;
        info!("platform space {} created", platform_dir.display());
        true
    };

    let project_dir = workspace.project_dir(project);
    let project_created = if project_dir.is_dir() {
        info!("project space {} already exists", project_dir.display());
        false
    } else {
        create_project(pm, workspace, project).context(SetupError::Create {
            what: "project space",
            path: project_dir.clone(),
        })?;
        info!("project space {} created", project_dir.display());
        true
    };

    Ok(SetupReport {
        platform_created,
        project_created,
    })
}

fn create_platform(dir: &Path) -> Result<()> {
    let licenses = dir.join("licenses");
    fs::create_dir_all(&licenses)
        .with_context(|| format!("creating directory '{}'", licenses.display()))?;
    write_new(&dir.join("mirrors.yaml"), MIRRORS_TEMPLATE)?;
    write_new(&dir.join("packages.yaml"), PACKAGES_TEMPLATE)?;
    write_new(&dir.join("compilers.yaml"), COMPILERS_TEMPLATE)?;
    write_new(&licenses.join("license.lic"), LICENSE_TEMPLATE)?;
    Ok(())
}

fn create_project(pm: &dyn PackageManager, workspace: &Workspace, project: &str) -> Result<()> {
    let dir = workspace.project_dir(project);
    fs::create_dir_all(&dir).with_context(|| format!("creating directory '{}'", dir.display()))?;

    let repo = repo_dir(&dir, project);
    pm.create_repo(&repo, project)?;
    write_new(&dir.join("repos.yaml"), &repos_template(&repo))?;
    write_new(&dir.join("packages.yaml"), PACKAGES_TEMPLATE)?;
    write_new(&workspace.manifest_path(project), &manifest_template(project))?;
    Ok(())
}

fn repo_dir(project_dir: &Path, project: &str) -> PathBuf {
    project_dir.join(format!("{}-repo", project))
}

fn repos_template(repo: &Path) -> String {
    format!("repos:\n- {}\n", repo.display())
}

/// Every recognised key, empty.
pub fn manifest_template(project: &str) -> String {
    let mut text = format!(
        "# Manifest for project {}.\n# Values are a list of specs or a comma-separated string.\n",
        project
    );
    for key in KNOWN_KEYS {
        text.push_str(key);
        text.push_str(":\n");
    }
    text
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing '{}'", path.display()))
}
