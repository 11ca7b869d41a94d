//! Immutable per-run configuration.
//!
//! Built once from the manifest, the resolved install paths and the detected
//! system compiler, then passed by reference to every builder and driver.

use anyhow::Result;
use tracing::{info, warn};

use crate::manifest::{self, Manifest, SpecList};
use crate::workspace::{InstallPaths, Workspace};

#[derive(Debug, Clone)]
pub struct Config {
    pub project: String,
    pub machine: String,
    pub paths: InstallPaths,
    /// Prefix generated module names with the project.
    pub project_modules: bool,
    pub system_compiler: String,

    pub base_packages: SpecList,
    pub base_compiler: String,
    pub compilers: SpecList,
    pub external_compilers: SpecList,
    pub utilities: SpecList,
    pub utility_compiler: String,
    pub mpis: SpecList,
    pub external_mpis: SpecList,
    pub cudas: SpecList,
    pub external_cudas: SpecList,
    pub tpls: SpecList,
    pub exclude_combos: SpecList,
}

impl Config {
    pub fn load(
        workspace: &Workspace,
        project: &str,
        machine: &str,
        paths: InstallPaths,
        system_compiler: &str,
        project_modules: bool,
    ) -> Result<Self> {
        let manifest = Manifest::load(&workspace.manifest_path(project))?;
        Ok(Self::from_manifest(
            &manifest,
            project,
            machine,
            paths,
            system_compiler,
            project_modules,
        ))
    }

    pub fn from_manifest(
        manifest: &Manifest,
        project: &str,
        machine: &str,
        paths: InstallPaths,
        system_compiler: &str,
        project_modules: bool,
    ) -> Self {
        let base_compiler = single_compiler(manifest, manifest::BASE_COMPILER, system_compiler);
        let utility_compiler =
            single_compiler(manifest, manifest::UTILITY_COMPILER, system_compiler);

        let compilers = manifest.get(manifest::COMPILERS);
        let mut external_compilers = manifest.get(manifest::EXTERNAL_COMPILERS);
        if compilers.is_absent() && external_compilers.is_absent() {
            info!(
                "no compilers requested; using system compiler {} as external",
                system_compiler
            );
            external_compilers = SpecList::new([system_compiler]);
        }

        Self {
            project: project.to_string(),
            machine: machine.to_string(),
            paths,
            project_modules,
            system_compiler: system_compiler.to_string(),
            base_packages: manifest.get(manifest::BASE_PACKAGES),
            base_compiler,
            compilers,
            external_compilers,
            utilities: manifest.get(manifest::UTILITIES),
            utility_compiler,
            mpis: manifest.get(manifest::MPIS),
            external_mpis: manifest.get(manifest::EXTERNAL_MPIS),
            cudas: manifest.get(manifest::CUDAS),
            external_cudas: manifest.get(manifest::EXTERNAL_CUDAS),
            tpls: manifest.get(manifest::TPLS),
            exclude_combos: manifest.get(manifest::EXCLUDE_COMBOS),
        }
    }

    /// Built and external compilers, non-empty only.
    pub fn all_compilers(&self) -> Vec<String> {
        self.compilers.chain(&self.external_compilers)
    }

    pub fn all_mpis(&self) -> Vec<String> {
        self.mpis.chain(&self.external_mpis)
    }

    pub fn all_cudas(&self) -> Vec<String> {
        self.cudas.chain(&self.external_cudas)
    }

    /// Intel compilers need a license staged into the Spack tree.
    pub fn needs_intel_license(&self) -> bool {
        self.compilers.contains("intel")
    }
}

fn single_compiler(manifest: &Manifest, key: &str, system_compiler: &str) -> String {
    let values = manifest.get(key);
    let mut entries = values.entries();
    match entries.next() {
        Some(first) => {
            if entries.next().is_some() {
                warn!("{} lists several compilers; using '{}'", key, first);
            }
            first.to_string()
        }
        None => system_compiler.to_string(),
    }
}
