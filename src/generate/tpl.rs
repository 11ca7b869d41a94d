//! Third-party library documents.
//!
//! The TPL matrix grows one dimension per active variant axis (MPI, CUDA).
//! Axes are collected up front in declaration order; each axis depends on the
//! axes declared after it, so the last axis is built first.

use super::document::{
    projections, quoted, Definition, EnvironmentDocument, InstallConfig, LmodRules, Matrix,
    ModuleRules, SpackEnvironment, SpecEntry, MPI_PROJECTION, TPL_PROJECTION,
};
use super::phases::{module_projection, path_string, platform_file, project_file, registry_file};
use crate::config::Config;

/// A variant axis with at least one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: &'static str,
    pub values: Vec<String>,
}

/// Active axes in declaration order: MPI, then CUDA.
pub fn active_axes(config: &Config) -> Vec<Axis> {
    [("mpis", config.all_mpis()), ("cudas", config.all_cudas())]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| Axis { name, values })
        .collect()
}

/// Matrix entries for `axes`: one per axis, last axis first, then the base
/// package entry which depends on every axis.
fn axis_specs(axes: &[Axis], exclude: &[String]) -> Vec<SpecEntry> {
    let mut specs = Vec::with_capacity(axes.len() + 1);
    for (idx, axis) in axes.iter().enumerate().rev() {
        let reference = format!("${}", axis.name);
        let mut matrix = Matrix::of(&[reference.as_str(), "$%compilers"]);
        for later in &axes[idx + 1..] {
            matrix.push_row(format!("$^{}", later.name));
        }
        specs.push(matrix);
    }

    let mut base = Matrix::of(&["$packages", "$%compilers"]);
    for axis in axes {
        base.push_row(format!("$^{}", axis.name));
    }
    specs.push(base);

    specs
        .into_iter()
        .map(|mut matrix| {
            matrix.exclude = exclude.to_vec();
            SpecEntry::Matrix(matrix)
        })
        .collect()
}

pub fn tpl(config: &Config) -> EnvironmentDocument {
    let mut include = vec![
        registry_file(&config.paths.base_packages(), "packages.yaml"),
        registry_file(&config.paths.utility(), "packages.yaml"),
        project_file(config, "packages.yaml"),
        project_file(config, "repos.yaml"),
        platform_file(config, "packages.yaml"),
        platform_file(config, "mirrors.yaml"),
        platform_file(config, "compilers.yaml"),
    ];
    if !config.compilers.is_absent() {
        include.insert(2, registry_file(&config.paths.compiler(), "compilers.yaml"));
    }

    let compilers = config.all_compilers();
    let tpls = config.tpls.to_vec();
    let axes = active_axes(config);
    let exclude: Vec<String> = config.exclude_combos.entries().map(quoted).collect();

    let mut definitions = vec![
        Definition::new("compilers", compilers.clone()),
        Definition::new("packages", tpls.clone()),
    ];
    let mut whitelist = tpls;
    whitelist.extend(compilers.iter().cloned());
    for axis in &axes {
        definitions.push(Definition::new(axis.name, axis.values.clone()));
        whitelist.extend(axis.values.iter().cloned());
    }

    let mut rules = LmodRules::new(whitelist, &module_projection(config));
    rules.core_compilers = Some(vec![config.utility_compiler.clone()]);
    rules.core_specs = Some(compilers);
    rules.hierarchy = Some(vec!["mpi".to_string()]);
    rules.blacklist = Some(vec!["lmod".to_string()]);

    EnvironmentDocument {
        spack: SpackEnvironment {
            include,
            concretization: None,
            definitions,
            specs: axis_specs(&axes, &exclude),
            config: tpl_install_config(config),
            view: false,
            modules: Some(ModuleRules::lmod(rules)),
        },
    }
}

/// One fully concretized stack: a single compiler, MPI and CUDA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleStack {
    pub compiler: String,
    pub mpi: String,
    pub cuda: String,
}

impl SingleStack {
    pub fn document_name(&self, project: &str) -> String {
        format!(
            "{}-{}-{}-{}-spack.yaml",
            project, self.compiler, self.mpi, self.cuda
        )
    }
}

/// Every compiler × MPI × CUDA combination, compiler-major.
pub fn all_stacks(config: &Config) -> Vec<SingleStack> {
    let mpis = config.all_mpis();
    let cudas = config.all_cudas();
    let mut stacks = Vec::new();
    for compiler in config.all_compilers() {
        for mpi in &mpis {
            for cuda in &cudas {
                stacks.push(SingleStack {
                    compiler: compiler.clone(),
                    mpi: mpi.clone(),
                    cuda: cuda.clone(),
                });
            }
        }
    }
    stacks
}

pub fn single_stack(config: &Config, stack: &SingleStack) -> EnvironmentDocument {
    let mut packages = config.tpls.to_vec();
    packages.extend(config.utilities.entries().map(str::to_string));
    packages.push(stack.mpi.clone());
    packages.push(stack.cuda.clone());

    let mut rules = LmodRules::new(
        packages.clone(),
        &format!("{}-{{name}}/{{version}}", config.project),
    );
    rules.hierarchy = Some(vec!["mpi".to_string()]);
    rules.blacklist = Some(vec!["lmod".to_string()]);

    EnvironmentDocument {
        spack: SpackEnvironment {
            include: vec![
                registry_file(&config.paths.base_packages(), "packages.yaml"),
                registry_file(&config.paths.utility(), "packages.yaml"),
                project_file(config, "repos.yaml"),
                platform_file(config, "packages.yaml"),
                platform_file(config, "mirrors.yaml"),
                platform_file(config, "compilers.yaml"),
            ],
            concretization: Some("together".to_string()),
            definitions: vec![
                Definition::new("compiler", vec![stack.compiler.clone()]),
                Definition::new("packages", packages),
            ],
            specs: vec![SpecEntry::Matrix(Matrix::of(&["$packages", "$%compiler"]))],
            config: tpl_install_config(config),
            view: false,
            modules: Some(ModuleRules::lmod(rules)),
        },
    }
}

fn tpl_install_config(config: &Config) -> InstallConfig {
    InstallConfig::new(
        path_string(&config.paths.tpl()),
        projections(&[
            ("^mpi", quoted(MPI_PROJECTION)),
            ("all", quoted(TPL_PROJECTION)),
        ]),
        path_string(&config.paths.modulefiles),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config_from;
    use serde_yaml::Value;

    const BASE: &str = "SPACK_CM_COMPILERS: [gcc@10.1.0]\nSPACK_CM_TPLS: [hdf5, netcdf-c]\n";

    fn specs_of(config: &Config) -> Value {
        serde_yaml::to_value(tpl(config)).unwrap()["spack"]["specs"].clone()
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn no_axes_gives_single_entry() {
        let config = config_from(&format!(
            "{BASE}SPACK_CM_MPIS: ''\nSPACK_CM_CUDAS: ''\nSPACK_CM_EXCLUDE_COMBOS: ''\n"
        ));
        assert_eq!(
            specs_of(&config),
            yaml("- matrix: [[$packages], [$%compilers]]\n")
        );
        let doc = serde_yaml::to_value(tpl(&config)).unwrap();
        let defs = doc["spack"]["definitions"].as_sequence().unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            doc["spack"]["modules"]["lmod"]["whitelist"],
            yaml("[hdf5, netcdf-c, gcc@10.1.0]")
        );
    }

    #[test]
    fn mpi_axis_precedes_base_entry() {
        let config = config_from(&format!("{BASE}SPACK_CM_MPIS: [openmpi@4.0.5]\n"));
        assert_eq!(
            specs_of(&config),
            yaml(
                "- matrix: [[$mpis], [$%compilers]]\n\
                 - matrix: [[$packages], [$%compilers], [$^mpis]]\n"
            )
        );
    }

    #[test]
    fn cuda_without_mpi_is_well_formed() {
        let config = config_from(&format!("{BASE}SPACK_CM_CUDAS: [cuda@11.0.2]\n"));
        assert_eq!(
            specs_of(&config),
            yaml(
                "- matrix: [[$cudas], [$%compilers]]\n\
                 - matrix: [[$packages], [$%compilers], [$^cudas]]\n"
            )
        );
    }

    #[test]
    fn cuda_entry_precedes_mpi_entry() {
        let config = config_from(&format!(
            "{BASE}SPACK_CM_MPIS: [openmpi@4.0.5]\nSPACK_CM_EXTERNAL_CUDAS: [cuda@11.0.2]\n"
        ));
        assert_eq!(
            specs_of(&config),
            yaml(
                "- matrix: [[$cudas], [$%compilers]]\n\
                 - matrix: [[$mpis], [$%compilers], [$^cudas]]\n\
                 - matrix: [[$packages], [$%compilers], [$^mpis], [$^cudas]]\n"
            )
        );
        let doc = serde_yaml::to_value(tpl(&config)).unwrap();
        assert_eq!(
            doc["spack"]["definitions"],
            yaml(
                "- compilers: [gcc@10.1.0]\n\
                 - packages: [hdf5, netcdf-c]\n\
                 - mpis: [openmpi@4.0.5]\n\
                 - cudas: [cuda@11.0.2]\n"
            )
        );
        assert_eq!(
            doc["spack"]["modules"]["lmod"]["whitelist"],
            yaml("[hdf5, netcdf-c, gcc@10.1.0, openmpi@4.0.5, cuda@11.0.2]")
        );
    }

    #[test]
    fn exclusions_apply_to_every_entry() {
        let config = config_from(&format!(
            "{BASE}SPACK_CM_MPIS: [openmpi@4.0.5]\nSPACK_CM_EXCLUDE_COMBOS: ['%intel ^openmpi']\n"
        ));
        let specs = specs_of(&config);
        for entry in specs.as_sequence().unwrap() {
            assert_eq!(entry["exclude"], yaml("['\"%intel ^openmpi\"']"));
        }
    }

    #[test]
    fn compiler_registry_included_at_third_position() {
        let config = config_from(BASE);
        let doc = serde_yaml::to_value(tpl(&config)).unwrap();
        assert_eq!(
            doc["spack"]["include"][2],
            Value::from("/opt/stack/install/demo/compiler/compilers.yaml")
        );
    }

    #[test]
    fn stacks_enumerate_every_combination() {
        let config = config_from(
            "SPACK_CM_COMPILERS: [gcc@10.1.0]\nSPACK_CM_EXTERNAL_COMPILERS: [intel@19.0.5]\n\
             SPACK_CM_MPIS: [openmpi@4.0.5, mpich@3.3]\nSPACK_CM_CUDAS: [cuda@11.0.2]\n",
        );
        let stacks = all_stacks(&config);
        assert_eq!(stacks.len(), 4);
        assert_eq!(
            stacks[1].document_name("demo"),
            "demo-gcc@10.1.0-mpich@3.3-cuda@11.0.2-spack.yaml"
        );
    }

    #[test]
    fn stacks_need_every_axis() {
        let config = config_from("SPACK_CM_COMPILERS: [gcc@10.1.0]\nSPACK_CM_MPIS: [openmpi@4.0.5]\n");
        assert!(all_stacks(&config).is_empty());
    }

    #[test]
    fn single_stack_concretizes_together() {
        let config = config_from(
            "SPACK_CM_TPLS: [hdf5]\nSPACK_CM_UTILITIES: [git]\nSPACK_CM_COMPILERS: [gcc@10.1.0]\n",
        );
        let stack = SingleStack {
            compiler: "gcc@10.1.0".to_string(),
            mpi: "openmpi@4.0.5".to_string(),
            cuda: "cuda@11.0.2".to_string(),
        };
        let doc = serde_yaml::to_value(single_stack(&config, &stack)).unwrap();
        assert_eq!(doc["spack"]["concretization"], Value::from("together"));
        assert_eq!(
            doc["spack"]["definitions"][1]["packages"],
            yaml("[hdf5, git, openmpi@4.0.5, cuda@11.0.2]")
        );
    }
}
