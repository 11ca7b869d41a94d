//! Spack environment document generation.
//!
//! Each phase gets a typed [`document::EnvironmentDocument`] that is
//! serialized with serde_yaml into the project directory. All documents but
//! lmod are then post-processed with [`strip_quoting`]: the serializer
//! single-quotes strings that carry literal double quotes (`'"{name}"'`) and
//! the root prefix-inspection key (`'?'`), and Spack needs them as
//! double-quoted scalars and `""` respectively.

pub mod document;
pub mod phases;
pub mod tpl;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::GenerationError;
use crate::phase::Phase;
use crate::workspace::Workspace;
use document::EnvironmentDocument;

/// Remove every single quote and turn every `?` into `""`.
///
/// Idempotent: the output contains neither character.
pub fn strip_quoting(text: &str) -> String {
    text.replace('\'', "").replace('?', "\"\"")
}

pub fn render(doc: &EnvironmentDocument, post_process: bool) -> Result<String> {
    let text = serde_yaml::to_string(doc).context("serializing environment document")?;
    Ok(if post_process {
        strip_quoting(&text)
    } else {
        text
    })
}

pub fn write_document(path: &Path, doc: &EnvironmentDocument, post_process: bool) -> Result<()> {
    let text = render(doc, post_process)?;
    fs::write(path, text).context(GenerationError::Write(path.to_path_buf()))?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Document for `phase` and whether it is post-processed.
pub fn phase_document(config: &Config, phase: Phase) -> (EnvironmentDocument, bool) {
    match phase {
        Phase::BasePackages => (phases::base_packages(config), true),
        Phase::Lmod => (phases::lmod(config), false),
        Phase::Compilers => (phases::compilers(config), true),
        Phase::Utilities => (phases::utilities(config), true),
        Phase::Tpls => (tpl::tpl(config), true),
    }
}

pub fn document_path(workspace: &Workspace, project: &str, phase: Phase) -> PathBuf {
    workspace.project_dir(project).join(phase.document_name())
}

#[derive(Debug, Default)]
pub struct GeneratedDocuments {
    pub phases: Vec<(Phase, PathBuf)>,
    pub stacks: Vec<PathBuf>,
}

impl GeneratedDocuments {
    pub fn path_for(&self, phase: Phase) -> Option<&Path> {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, path)| path.as_path())
    }
}

/// Write every phase document and every single-stack document, or only the
/// single stacks when `stacks_only` is set.
pub fn generate_all(
    workspace: &Workspace,
    config: &Config,
    stacks_only: bool,
) -> Result<GeneratedDocuments> {
    let result = generate_documents(workspace, config, stacks_only).context(
        GenerationError::Documents {
            project: config.project.clone(),
        },
    );
    if let Err(err) = &result {
        error!("{:#}", err);
    }
    result
}

fn generate_documents(
    workspace: &Workspace,
    config: &Config,
    stacks_only: bool,
) -> Result<GeneratedDocuments> {
    let project_dir = workspace.project_dir(&config.project);
    fs::create_dir_all(&project_dir)
        .with_context(|| format!("creating project directory '{}'", project_dir.display()))?;

    let mut generated = GeneratedDocuments::default();
    if !stacks_only {
        for phase in Phase::ALL {
            let (doc, post_process) = phase_document(config, phase);
            let path = document_path(workspace, &config.project, phase);
            write_document(&path, &doc, post_process)?;
            generated.phases.push((phase, path));
        }
    }

    for stack in tpl::all_stacks(config) {
        let path = project_dir.join(stack.document_name(&config.project));
        write_document(&path, &tpl::single_stack(config, &stack), true)?;
        generated.stacks.push(path);
    }

    info!(
        "generated {} phase and {} single-stack documents in {}",
        generated.phases.len(),
        generated.stacks.len(),
        project_dir.display()
    );
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config_from;
    use serde_yaml::Value;
    use tempfile::TempDir;

    #[test]
    fn strip_quoting_is_idempotent() {
        let input = "a: '\"{name}\"'\n'?':\n- CMAKE_PREFIX_PATH\nb: 'x''y'\n";
        let once = strip_quoting(input);
        assert_eq!(strip_quoting(&once), once);
        assert!(!once.contains('\''));
        assert!(!once.contains('?'));
        assert!(once.contains("\"\":"));
    }

    #[test]
    fn post_processed_tpl_parses_as_spack_expects() {
        let config = config_from(
            "SPACK_CM_COMPILERS: [gcc@10.1.0]\nSPACK_CM_TPLS: [hdf5]\n\
             SPACK_CM_MPIS: [openmpi@4.0.5]\nSPACK_CM_EXCLUDE_COMBOS: ['%intel']\n",
        );
        let text = render(&tpl::tpl(&config), true).unwrap();

        assert!(text.contains("\"%intel\""));
        assert!(!text.contains('\''));

        let parsed: Value = serde_yaml::from_str(&text).unwrap();
        let spack = &parsed["spack"];
        assert_eq!(spack["specs"][0]["exclude"][0], Value::from("%intel"));
        assert_eq!(
            spack["config"]["install_tree"]["projections"]["all"],
            Value::from(document::TPL_PROJECTION)
        );
        let inspections = &spack["modules"]["prefix_inspections"];
        assert_eq!(inspections[""][0], Value::from("CMAKE_PREFIX_PATH"));
        assert_eq!(
            spack["modules"]["lmod"]["all"]["environment"]["set"]["{name}_ROOT"],
            Value::from("{prefix}")
        );
        assert_eq!(spack["specs"][1]["matrix"][2][0], Value::from("$^mpis"));
    }

    #[test]
    fn lmod_document_is_not_post_processed() {
        let config = config_from("");
        let text = render(&phases::lmod(&config), false).unwrap();
        let parsed: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            parsed["spack"]["config"]["install_tree"]["projections"]["all"],
            Value::from(document::SPEC_PROJECTION)
        );
    }

    #[test]
    fn generate_all_writes_phase_documents() {
        let home = TempDir::new().unwrap();
        let workspace = Workspace::new(home.path());
        let config = config_from(
            "SPACK_CM_BASE_PACKAGES: [cmake]\nSPACK_CM_TPLS: [hdf5]\n\
             SPACK_CM_MPIS: [openmpi@4.0.5]\nSPACK_CM_CUDAS: [cuda@11.0.2]\n",
        );

        let generated = generate_all(&workspace, &config, false).unwrap();
        assert_eq!(generated.phases.len(), Phase::ALL.len());
        for (_, path) in &generated.phases {
            assert!(path.is_file(), "{}", path.display());
        }
        assert_eq!(
            generated.path_for(Phase::Tpls),
            Some(workspace.project_dir("demo").join("tpl-spack.yaml").as_path())
        );
        // system compiler is the only external compiler
        assert_eq!(generated.stacks.len(), 1);
        assert!(generated.stacks[0].ends_with("demo-gcc@8.3.1-openmpi@4.0.5-cuda@11.0.2-spack.yaml"));
    }

    #[test]
    fn stacks_only_skips_phase_documents() {
        let home = TempDir::new().unwrap();
        let workspace = Workspace::new(home.path());
        let config = config_from("SPACK_CM_MPIS: [mpich@3.3]\nSPACK_CM_CUDAS: [cuda@10.2]\n");

        let generated = generate_all(&workspace, &config, true).unwrap();
        assert!(generated.phases.is_empty());
        assert_eq!(generated.stacks.len(), 1);
        assert!(!workspace.project_dir("demo").join("tpl-spack.yaml").exists());
    }
}
