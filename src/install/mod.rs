//! The `install` workflow.
//!
//! Generates every environment document, then installs the selected phases in
//! order. Each installed phase is followed by its post-processing step:
//!
//! | phase         | afterwards                                  |
//! |---------------|---------------------------------------------|
//! | base-packages | `base-packages/packages.yaml`               |
//! | lmod          | module init script                          |
//! | compilers     | compiler registration, `compilers.yaml`     |
//! | utilities     | `utility/packages.yaml`                     |
//! | tpl           | `tpl/packages.yaml`                         |
//!
//! The staged Intel license is removed when the run ends, whatever the outcome.

pub mod cleanup;
pub mod compilers;
pub mod driver;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{InstallError, RegistryError};
use crate::generate::{self, GeneratedDocuments};
use crate::io::ensure_placeholder;
use crate::licenses;
use crate::manifest;
use crate::module_init;
use crate::phase::{Phase, Stage};
use crate::registry::{write_package_registry, RegistryOptions};
use crate::run_record::{InstallRunRecord, PhaseStatus};
use crate::settings::Attempts;
use crate::spack::{InstallFlags, PackageManager};
use crate::workspace::Workspace;
use driver::{DriverOptions, PhaseRun};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub stage: Stage,
    pub flags: InstallFlags,
    /// Let Spack detect external packages during cleanup.
    pub external: bool,
    /// Only write the single-stack documents; install nothing.
    pub stacks_only: bool,
}

pub struct Installer<'a> {
    pm: &'a dyn PackageManager,
    workspace: &'a Workspace,
    config: &'a Config,
    attempts: Attempts,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        pm: &'a dyn PackageManager,
        workspace: &'a Workspace,
        config: &'a Config,
        attempts: Attempts,
        options: InstallOptions,
    ) -> Self {
        Self {
            pm,
            workspace,
            config,
            attempts,
            options,
        }
    }

    /// Run the workflow and return the final run record.
    pub fn run(&self) -> Result<InstallRunRecord> {
        let record_path = self.workspace.run_record_path(&self.config.project);
        let mut record =
            InstallRunRecord::start(&self.config.project, &self.config.machine, self.options.stage)?;
        record.write(&record_path)?;

        let result = self.run_phases(&mut record);
        let license_cleanup = licenses::remove_intel_license(self.pm.root());
        if let Err(err) = &license_cleanup {
            error!("{:#}", err);
        }

        record.finish(result.is_ok() && license_cleanup.is_ok());
        if let Err(err) = record.write(&record_path) {
            if result.is_err() {
                // Keep the install failure as the reported error.
                error!("{:#}", err);
            } else {
                return Err(err);
            }
        }

        result?;
        license_cleanup?;
        Ok(record)
    }

    fn run_phases(&self, record: &mut InstallRunRecord) -> Result<()> {
        let config = self.config;
        if config.needs_intel_license() {
            licenses::stage_intel_license(
                self.pm.root(),
                &self.workspace.platform_dir(&config.machine),
            )?;
        }

        let generated = generate::generate_all(self.workspace, config, self.options.stacks_only)?;
        if self.options.stacks_only {
            warn!(
                "generated {} single-stack documents; nothing will be installed",
                generated.stacks.len()
            );
            return Ok(());
        }

        self.create_placeholder_registries()?;

        for phase in Phase::ALL {
            if !self.options.stage.includes(phase) {
                continue;
            }
            if let Some(key) = self.empty_phase_key(phase) {
                warn!("{} is empty; skipping {} install", key, phase);
                record.record_phase(phase, PhaseStatus::Skipped, 0);
                continue;
            }

            let attempts = match self.install(phase, &generated) {
                Ok(attempts) => attempts,
                Err(err) => {
                    record.record_phase(phase, PhaseStatus::Failed, attempts_made(&err));
                    return Err(err);
                }
            };
            if let Err(err) = self.after_install(phase) {
                record.record_phase(phase, PhaseStatus::Failed, attempts);
                return Err(err);
            }
            record.record_phase(phase, PhaseStatus::Installed, attempts);
        }

        info!("install of project {} finished", config.project);
        Ok(())
    }

    /// Registries later documents include must exist before the first install.
    fn create_placeholder_registries(&self) -> Result<()> {
        let paths = &self.config.paths;
        let compilers = paths.compiler().join("compilers.yaml");
        ensure_placeholder(&compilers).context(RegistryError::Compilers(compilers.clone()))?;
        for registry in [
            paths.utility().join("packages.yaml"),
            paths.base_packages().join("packages.yaml"),
        ] {
            ensure_placeholder(&registry).context(RegistryError::Write(registry.clone()))?;
        }
        Ok(())
    }

    /// The manifest key whose absence skips `phase`, if it is absent.
    fn empty_phase_key(&self, phase: Phase) -> Option<&'static str> {
        let config = self.config;
        let (key, list) = match phase {
            Phase::BasePackages => (manifest::BASE_PACKAGES, &config.base_packages),
            Phase::Compilers => (manifest::COMPILERS, &config.compilers),
            Phase::Utilities => (manifest::UTILITIES, &config.utilities),
            Phase::Tpls => (manifest::TPLS, &config.tpls),
            Phase::Lmod => return None,
        };
        list.is_absent().then_some(key)
    }

    fn install(&self, phase: Phase, generated: &GeneratedDocuments) -> Result<u32> {
        let document = generated
            .path_for(phase)
            .ok_or_else(|| anyhow!("no generated document for {}", phase))?;
        let active = self.workspace.active_document(&self.config.project);
        let run = PhaseRun {
            phase,
            document,
            active: &active,
            max_attempts: self.attempts.for_phase(phase),
            generate_modules: phase.generates_modules(),
        };
        driver::install_phase(
            self.pm,
            &run,
            DriverOptions {
                flags: self.options.flags,
                external: self.options.external,
            },
        )
    }

    fn after_install(&self, phase: Phase) -> Result<()> {
        let config = self.config;
        let paths = &config.paths;
        match phase {
            Phase::BasePackages => {
                write_package_registry(&paths.base_packages(), RegistryOptions::default())?;
            }
            Phase::Lmod => {
                module_init::write_module_init(
                    self.workspace,
                    &config.project,
                    &config.machine,
                    &paths.lmod(),
                    &paths.modulefiles,
                )?;
            }
            Phase::Compilers => {
                let env_dir: PathBuf = self.workspace.project_dir(&config.project);
                compilers::write_compiler_registry(
                    self.pm,
                    &env_dir,
                    &self.workspace.active_document(&config.project),
                    &config.compilers.to_vec(),
                    &paths.compiler(),
                )?;
            }
            Phase::Utilities => {
                write_package_registry(&paths.utility(), RegistryOptions::default())?;
            }
            Phase::Tpls => {
                write_package_registry(&paths.tpl(), RegistryOptions::default())?;
            }
        }
        Ok(())
    }
}

fn attempts_made(err: &anyhow::Error) -> u32 {
    match err.downcast_ref::<InstallError>() {
        Some(InstallError::ExhaustedRetries { attempts, .. }) => *attempts,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::run_record::RunStatus;
    use crate::testing::FakeSpack;
    use crate::workspace::InstallPaths;
    use serde_yaml::Value;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const FULL_MANIFEST: &str = "\
SPACK_CM_BASE_PACKAGES: [cmake, python]
SPACK_CM_BASE_COMPILER: gcc@8.3.1
SPACK_CM_COMPILERS: [gcc@10.1.0]
SPACK_CM_UTILITIES: [git]
SPACK_CM_MPIS: [openmpi@4.0.5]
SPACK_CM_TPLS: [hdf5, zlib]
";

    fn config_in(root: &Path, yaml: &str) -> Config {
        let manifest = Manifest::parse(yaml).unwrap();
        let paths = InstallPaths {
            install: root.join("install/demo"),
            modulefiles: root.join("modulefiles/demo"),
        };
        Config::from_manifest(&manifest, "demo", "box", paths, "gcc@8.3.1", true)
    }

    fn yaml(path: &Path) -> Value {
        serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn full_install_runs_every_phase_and_post_processing() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::new(tmp.path().join("home"));
        let config = config_in(tmp.path(), FULL_MANIFEST);
        let spack = FakeSpack::new(&tmp.path().join("spack"));

        let record = Installer::new(
            &spack,
            &workspace,
            &config,
            Attempts::default(),
            InstallOptions::default(),
        )
        .run()
        .unwrap();

        assert_eq!(spack.install_count(), 5);
        assert_eq!(spack.cleans.get(), 5);
        assert_eq!(spack.refreshes.get(), 3);
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.phases.len(), 5);
        assert!(record.phases.iter().all(|p| p.status == PhaseStatus::Installed));

        let paths = &config.paths;
        for dir in [paths.base_packages(), paths.utility(), paths.tpl()] {
            let registry = yaml(&dir.join("packages.yaml"));
            assert_eq!(
                registry["packages"]["zlib"]["externals"][0]["spec"],
                Value::from("zlib@1.2.11%gcc@8.3.1")
            );
        }
        let compilers = yaml(&paths.compiler().join("compilers.yaml"));
        assert_eq!(
            compilers["compilers"][0]["compiler"]["spec"],
            Value::from("gcc@10.1.0")
        );
        assert!(workspace
            .project_dir("demo")
            .join("module-init-scripts/demo-modules-box-init.sh")
            .is_file());

        let stored = InstallRunRecord::load(&workspace.run_record_path("demo")).unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn absent_lists_skip_their_phases() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::new(tmp.path().join("home"));
        let config = config_in(tmp.path(), "SPACK_CM_UTILITIES: [git]\n");
        let spack = FakeSpack::new(&tmp.path().join("spack"));

        let record = Installer::new(
            &spack,
            &workspace,
            &config,
            Attempts::default(),
            InstallOptions::default(),
        )
        .run()
        .unwrap();

        // lmod and utilities only.
        assert_eq!(spack.install_count(), 2);
        let skipped: Vec<_> = record
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Skipped)
            .map(|p| p.phase.as_str())
            .collect();
        assert_eq!(skipped, vec!["base-packages", "compilers", "tpl"]);
        // Placeholder registries exist for documents that include them.
        assert!(config.paths.compiler().join("compilers.yaml").is_file());
        assert!(config.paths.base_packages().join("packages.yaml").is_file());
    }

    #[test]
    fn stage_selects_a_single_phase() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::new(tmp.path().join("home"));
        let config = config_in(tmp.path(), FULL_MANIFEST);
        let spack = FakeSpack::new(&tmp.path().join("spack"));

        Installer::new(
            &spack,
            &workspace,
            &config,
            Attempts::default(),
            InstallOptions {
                stage: Stage::Tpl,
                ..InstallOptions::default()
            },
        )
        .run()
        .unwrap();

        assert_eq!(spack.install_count(), 1);
        assert!(config.paths.tpl().join("packages.yaml").is_file());
        let active = yaml(&workspace.active_document("demo"));
        assert!(active["spack"]["definitions"][0].get("compilers").is_some());
    }

    #[test]
    fn stacks_only_installs_nothing() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::new(tmp.path().join("home"));
        let manifest = format!("{}SPACK_CM_CUDAS: [cuda@11.0.2]\n", FULL_MANIFEST);
        let config = config_in(tmp.path(), &manifest);
        let spack = FakeSpack::new(&tmp.path().join("spack"));

        Installer::new(
            &spack,
            &workspace,
            &config,
            Attempts::default(),
            InstallOptions {
                stacks_only: true,
                ..InstallOptions::default()
            },
        )
        .run()
        .unwrap();

        assert_eq!(spack.install_count(), 0);
        let project = workspace.project_dir("demo");
        assert!(!project.join("tpl-spack.yaml").exists());
        assert!(fs::read_dir(&project)
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name() == "demo-gcc@10.1.0-openmpi@4.0.5-cuda@11.0.2-spack.yaml"));
    }

    #[test]
    fn failed_phase_stops_run_and_removes_license() {
        let tmp = TempDir::new().unwrap();
        let workspace = Workspace::new(tmp.path().join("home"));
        let platform = workspace.platform_dir("box");
        fs::create_dir_all(platform.join("licenses")).unwrap();
        fs::write(platform.join("licenses/license.lic"), "license").unwrap();
        let config = config_in(
            tmp.path(),
            "SPACK_CM_BASE_PACKAGES: [cmake]\nSPACK_CM_COMPILERS: [intel@19.0.5]\n",
        );
        let spack_root = tmp.path().join("spack");
        let spack = FakeSpack::always_failing(&spack_root);

        let err = Installer::new(
            &spack,
            &workspace,
            &config,
            Attempts::default(),
            InstallOptions::default(),
        )
        .run()
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::ExhaustedRetries { attempts: 2, .. })
        ));
        assert_eq!(spack.install_count(), 2);
        assert!(!licenses::license_dir(&spack_root).exists());

        let stored = InstallRunRecord::load(&workspace.run_record_path("demo")).unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.phases[0].status, PhaseStatus::Failed);
        assert_eq!(stored.phases[0].attempts, 2);
        assert!(stored.finished_at_utc.is_some());
    }
}
