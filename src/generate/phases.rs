//! Builders for the base-packages, lmod, compilers and utilities documents.

use std::path::Path;

use super::document::{
    projections, quoted, Definition, EnvironmentDocument, InstallConfig, LmodRules, Matrix,
    ModuleRules, SpackEnvironment, SpecEntry, MPI_PROJECTION, SPEC_PROJECTION,
};
use crate::config::Config;

pub(crate) fn project_file(config: &Config, name: &str) -> String {
    format!("../../project/{}/{}", config.project, name)
}

pub(crate) fn platform_file(config: &Config, name: &str) -> String {
    format!("../../platform/{}/{}", config.machine, name)
}

pub(crate) fn registry_file(install_dir: &Path, name: &str) -> String {
    format!("{}/{}", install_dir.display(), name)
}

pub(crate) fn path_string(path: &Path) -> String {
    path.display().to_string()
}

/// Lmod module naming: `<project>-{name}/{version}` or `{name}/{version}`.
pub(crate) fn module_projection(config: &Config) -> String {
    if config.project_modules {
        format!("{}-{{name}}/{{version}}", config.project)
    } else {
        "{name}/{version}".to_string()
    }
}

/// Project repos and packages, then the platform files.
fn standard_includes(config: &Config) -> Vec<String> {
    vec![
        project_file(config, "repos.yaml"),
        project_file(config, "packages.yaml"),
        platform_file(config, "packages.yaml"),
        platform_file(config, "mirrors.yaml"),
        platform_file(config, "compilers.yaml"),
    ]
}

/// The base-packages registry followed by [`standard_includes`].
fn includes_after_base(config: &Config) -> Vec<String> {
    let mut include = vec![registry_file(&config.paths.base_packages(), "packages.yaml")];
    include.extend(standard_includes(config));
    include
}

pub fn base_packages(config: &Config) -> EnvironmentDocument {
    let mut install = InstallConfig::new(
        path_string(&config.paths.base_packages()),
        projections(&[("all", quoted(SPEC_PROJECTION))]),
        path_string(&config.paths.modulefiles),
    );
    install.install_missing_compilers = true;

    EnvironmentDocument {
        spack: SpackEnvironment {
            include: standard_includes(config),
            concretization: None,
            definitions: vec![
                Definition::new("core_compiler", vec![config.base_compiler.clone()]),
                Definition::new("base_packages", config.base_packages.to_vec()),
            ],
            specs: vec![SpecEntry::Matrix(Matrix::of(&[
                "$base_packages",
                "$%core_compiler",
            ]))],
            config: install,
            view: false,
            modules: None,
        },
    }
}

/// Lmod is the only document written without post-processing, so its
/// projection stays unquoted.
pub fn lmod(config: &Config) -> EnvironmentDocument {
    EnvironmentDocument {
        spack: SpackEnvironment {
            include: includes_after_base(config),
            concretization: None,
            definitions: Vec::new(),
            specs: vec![SpecEntry::Spec("lmod".to_string())],
            config: InstallConfig::new(
                path_string(&config.paths.lmod()),
                projections(&[("all", SPEC_PROJECTION.to_string())]),
                path_string(&config.paths.modulefiles),
            ),
            view: false,
            modules: None,
        },
    }
}

pub fn compilers(config: &Config) -> EnvironmentDocument {
    let mut core = config.compilers.to_vec();
    core.push(config.base_compiler.clone());

    let mut rules = LmodRules::new(core.clone(), &module_projection(config));
    rules.core_specs = Some(core);

    EnvironmentDocument {
        spack: SpackEnvironment {
            include: includes_after_base(config),
            concretization: None,
            definitions: vec![
                Definition::new("core_compiler", vec![config.base_compiler.clone()]),
                Definition::new("compilers_to_build", config.compilers.to_vec()),
            ],
            specs: vec![SpecEntry::Matrix(Matrix::of(&[
                "$compilers_to_build",
                "$%core_compiler",
            ]))],
            config: InstallConfig::new(
                path_string(&config.paths.compiler()),
                projections(&[("all", quoted(SPEC_PROJECTION))]),
                path_string(&config.paths.modulefiles),
            ),
            view: false,
            modules: Some(ModuleRules::lmod(rules)),
        },
    }
}

pub fn utilities(config: &Config) -> EnvironmentDocument {
    let mut include = includes_after_base(config);
    if !config.compilers.is_absent() {
        include.insert(1, registry_file(&config.paths.compiler(), "compilers.yaml"));
    }

    let utilities = config.utilities.to_vec();
    let mut rules = LmodRules::new(utilities.clone(), &module_projection(config));
    rules.core_compilers = Some(vec![config.utility_compiler.clone()]);
    rules.core_specs = Some(utilities.clone());

    EnvironmentDocument {
        spack: SpackEnvironment {
            include,
            concretization: None,
            definitions: vec![
                Definition::new("core_compiler", vec![config.utility_compiler.clone()]),
                Definition::new("utility_packages", utilities),
            ],
            specs: vec![SpecEntry::Matrix(Matrix::of(&[
                "$utility_packages",
                "$%core_compiler",
            ]))],
            config: InstallConfig::new(
                path_string(&config.paths.utility()),
                projections(&[
                    ("^mpi", quoted(MPI_PROJECTION)),
                    ("all", quoted(SPEC_PROJECTION)),
                ]),
                path_string(&config.paths.modulefiles),
            ),
            view: false,
            modules: Some(ModuleRules::lmod(rules)),
        },
    }
}
