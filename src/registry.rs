//! Package registry post-processing.
//!
//! Reduces Spack's install index (`<install>/.spack-db/index.json`) into a
//! `packages.yaml` that marks every installed package as an external, so later
//! phases reuse the builds instead of rebuilding them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::RegistryError;
use crate::io::{ensure_placeholder, write_atomic};

/// Bootstrap package Spack installs for itself.
const SKIPPED_PACKAGES: &[&str] = &["py-setuptools"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Pin externals to `%compiler@version` and, for MPI dependents, `^mpi@version`.
    pub compiler_info: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            compiler_info: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct External {
    pub spec: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEntry {
    #[serde(skip)]
    pub name: String,
    pub buildable: bool,
    pub externals: Vec<External>,
}

/// `packages:` mapping, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packages(pub Vec<PackageEntry>);

impl Packages {
    fn add(&mut self, name: &str, external: External) {
        match self.0.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.externals.push(external),
            None => self.0.push(PackageEntry {
                name: name.to_string(),
                buildable: true,
                externals: vec![external],
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PackageEntry> {
        self.0.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Packages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.name, entry)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageRegistry {
    pub packages: Packages,
}

#[derive(Debug, Deserialize)]
struct InstallIndex {
    database: Database,
}

#[derive(Debug, Deserialize)]
struct Database {
    installs: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct InstallRecord {
    spec: Map<String, Value>,
    path: String,
}

#[derive(Debug, Deserialize)]
struct SpecNode {
    version: Value,
    compiler: Option<CompilerRef>,
    #[serde(default)]
    dependencies: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompilerRef {
    name: String,
    version: Value,
}

pub fn index_path(install_dir: &Path) -> PathBuf {
    install_dir.join(".spack-db").join("index.json")
}

/// Build the registry from the text of an install index.
pub fn build_registry(index_json: &str, options: RegistryOptions) -> Result<PackageRegistry> {
    let index: InstallIndex = serde_json::from_str(index_json).context("parsing install index")?;
    let mut packages = Packages::default();

    for (hash, record) in index.database.installs {
        let record: InstallRecord = serde_json::from_value(record)
            .with_context(|| format!("install record '{}'", hash))?;
        let Some((name, node)) = record.spec.into_iter().next() else {
            anyhow::bail!("install record '{}' has an empty spec", hash);
        };
        if SKIPPED_PACKAGES.contains(&name.as_str()) {
            continue;
        }
        let node: SpecNode = serde_json::from_value(node)
            .with_context(|| format!("spec of '{}' in record '{}'", name, hash))?;

        let spec = if options.compiler_info {
            pinned_spec(&name, &node, &record.path)
                .with_context(|| format!("install record '{}'", hash))?
        } else {
            format!("{}@{}", name, scalar(&node.version))
        };
        packages.add(
            &name,
            External {
                spec,
                prefix: record.path,
            },
        );
    }

    Ok(PackageRegistry { packages })
}

/// `name@version%compiler@version`, plus `^<mpi>@<version>` for every MPI
/// dependency, read from the last two install path segments.
///
/// MPI dependents are installed under `.../<mpi-name>/<mpi-version>` by the
/// `^mpi` install-tree projection, so the prefix encodes the MPI they were
/// built against.
fn pinned_spec(name: &str, node: &SpecNode, prefix: &str) -> Result<String> {
    let compiler = node
        .compiler
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("package '{}' has no compiler", name))?;
    let mut spec = format!(
        "{}@{}%{}@{}",
        name,
        scalar(&node.version),
        compiler.name,
        scalar(&compiler.version)
    );

    let mpi_deps = dependency_names(node.dependencies.as_ref())
        .into_iter()
        .filter(|dep| dep.contains("mpi"))
        .count();
    if mpi_deps > 0 {
        let segments: Vec<&str> = prefix.trim_end_matches('/').rsplit('/').take(2).collect();
        let [mpi_version, mpi_name] = segments.as_slice() else {
            anyhow::bail!(
                "package '{}' depends on MPI but prefix '{}' has no <mpi>/<version> segments",
                name,
                prefix
            );
        };
        if mpi_name.is_empty() || mpi_version.is_empty() {
            anyhow::bail!(
                "package '{}' depends on MPI but prefix '{}' has an empty <mpi>/<version> segment",
                name,
                prefix
            );
        }
        for _ in 0..mpi_deps {
            spec.push_str(&format!("^{}@{}", mpi_name, mpi_version));
        }
    }
    Ok(spec)
}

/// Dependency names from either the mapping or the list form of the index.
fn dependency_names(deps: Option<&Value>) -> Vec<String> {
    match deps {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Regenerate `<install_dir>/packages.yaml` from the install index.
///
/// The directory and an empty registry are created first so that documents
/// including it stay valid even when this fails.
pub fn write_package_registry(install_dir: &Path, options: RegistryOptions) -> Result<PathBuf> {
    let registry_path = install_dir.join("packages.yaml");
    let result = regenerate(install_dir, &registry_path, options);
    if let Err(err) = &result {
        error!("{:#}", err);
    }
    result.map(|_| registry_path)
}

fn regenerate(install_dir: &Path, registry_path: &Path, options: RegistryOptions) -> Result<()> {
    ensure_placeholder(registry_path).context(RegistryError::Write(registry_path.to_path_buf()))?;
    info!("creating new packages.yaml in {}", registry_path.display());

    let index = index_path(install_dir);
    let text = fs::read_to_string(&index).context(RegistryError::Index(index.clone()))?;
    let registry = build_registry(&text, options).map_err(|err| {
        anyhow::Error::new(RegistryError::Malformed {
            path: index.clone(),
            reason: format!("{:#}", err),
        })
    })?;
    let yaml = serde_yaml::to_string(&registry)
        .context(RegistryError::Write(registry_path.to_path_buf()))?;
    write_atomic(registry_path, yaml.as_bytes())
        .context(RegistryError::Write(registry_path.to_path_buf()))?;
    info!(
        "registered {} packages in {}",
        registry.packages.len(),
        registry_path.display()
    );
    Ok(())
}
