//! Typed model of a Spack environment document (`spack.yaml`).
//!
//! Field order follows the order Spack documents them in; serde_yaml keeps
//! struct field order and [`Mapping`] insertion order.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// Install-tree template shared by most phases.
pub const SPEC_PROJECTION: &str = "{name}/{version}/{compiler.name}/{compiler.version}/{hash:7}";
/// Install-tree template for packages depending on MPI.
pub const MPI_PROJECTION: &str =
    "{name}/{version}/{compiler.name}/{compiler.version}/{^mpi.name}/{^mpi.version}/{hash:7}";
/// Install-tree template for TPLs built without MPI.
pub const TPL_PROJECTION: &str =
    "{name}/{version}/{compiler.name}/{compiler.version}/base/{hash:7}";

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentDocument {
    pub spack: SpackEnvironment,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpackEnvironment {
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concretization: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<Definition>,
    pub specs: Vec<SpecEntry>,
    pub config: InstallConfig,
    pub view: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModuleRules>,
}

/// A named spec list, `{name: [values]}`, referenced as `$name` in matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub values: Vec<String>,
}

impl Definition {
    pub fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

impl Serialize for Definition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.values)?;
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SpecEntry {
    Spec(String),
    Matrix(Matrix),
}

/// A spec matrix: the cartesian product of its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matrix {
    pub matrix: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Matrix {
    /// One single-reference row per item, e.g. `["$packages", "$%compilers"]`.
    pub fn of(rows: &[&str]) -> Self {
        Self {
            matrix: rows.iter().map(|row| vec![row.to_string()]).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: impl Into<String>) {
        self.matrix.push(vec![row.into()]);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallConfig {
    pub install_tree: InstallTree,
    pub module_roots: ModuleRoots,
    pub install_missing_compilers: bool,
}

impl InstallConfig {
    pub fn new(root: String, projections: Mapping, module_root: String) -> Self {
        Self {
            install_tree: InstallTree { root, projections },
            module_roots: ModuleRoots { lmod: module_root },
            install_missing_compilers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallTree {
    pub root: String,
    pub projections: Mapping,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleRoots {
    pub lmod: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleRules {
    pub enable: Vec<String>,
    pub prefix_inspections: Mapping,
    pub lmod: LmodRules,
}

impl ModuleRules {
    pub fn lmod(rules: LmodRules) -> Self {
        Self {
            enable: vec!["lmod".to_string()],
            prefix_inspections: prefix_inspections(),
            lmod: rules,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LmodRules {
    pub hash_length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_compilers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_specs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Vec<String>>,
    pub whitelist: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<String>>,
    pub blacklist_implicits: bool,
    pub all: ModuleDefaults,
    pub projections: Mapping,
    pub verbose: bool,
}

impl LmodRules {
    /// Rules shared by every phase that generates modules.
    pub fn new(whitelist: Vec<String>, module_projection: &str) -> Self {
        Self {
            hash_length: 0,
            core_compilers: None,
            core_specs: None,
            hierarchy: None,
            whitelist,
            blacklist: None,
            blacklist_implicits: true,
            all: ModuleDefaults::default(),
            projections: projections(&[("all", quoted(module_projection))]),
            verbose: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleDefaults {
    pub conflict: Vec<String>,
    pub environment: ModuleEnvironment,
}

impl Default for ModuleDefaults {
    fn default() -> Self {
        let set = [
            ("ROOT", "{prefix}"),
            ("VERSION", "{version}"),
            ("BIN", "{prefix.bin}"),
            ("INC", "{prefix.include}"),
            ("LIB", "{prefix.lib}"),
        ]
        .iter()
        .map(|(suffix, value)| {
            (
                Value::from(quoted(&format!("{{name}}_{}", suffix))),
                Value::from(quoted(value)),
            )
        })
        .collect();
        Self {
            conflict: vec![quoted("{name}")],
            environment: ModuleEnvironment { set },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleEnvironment {
    pub set: Mapping,
}

/// Wrap `value` in literal double quotes. After post-processing the
/// serializer's single quotes are gone and these become YAML double quotes.
pub fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Ordered `{selector: template}` mapping.
pub fn projections(entries: &[(&str, String)]) -> Mapping {
    entries
        .iter()
        .map(|(key, value)| (Value::from(*key), Value::from(value.as_str())))
        .collect()
}

/// Prefix sub-directories and the variables Lmod prepends them to. The `?`
/// key is the install prefix itself and is rewritten to `""` on output.
fn prefix_inspections() -> Mapping {
    const TABLE: &[(&str, &[&str])] = &[
        ("bin", &["PATH"]),
        ("man", &["MANPATH"]),
        ("share/man", &["ACLOCAL_PATH"]),
        ("lib", &["LIBRARY_PATH", "LD_LIBRARY_PATH"]),
        ("lib64", &["LIBRARY_PATH", "LD_LIBRARY_PATH"]),
        ("include", &["CPATH", "INCLUDE"]),
        ("lib/pkgconfig", &["PKG_CONFIG_PATH"]),
        ("lib64/pkgconfig", &["PKG_CONFIG_PATH"]),
        ("share/pkgconfig", &["PKG_CONFIG_PATH"]),
        ("?", &["CMAKE_PREFIX_PATH"]),
    ];
    TABLE
        .iter()
        .map(|(dir, vars)| {
            let vars: Vec<Value> = vars.iter().map(|v| Value::from(*v)).collect();
            (Value::from(*dir), Value::Sequence(vars))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_serializes_as_single_key_map() {
        let def = Definition::new("core_compiler", vec!["gcc@9.2.0".to_string()]);
        let text = serde_yaml::to_string(&vec![def]).unwrap();
        let parsed: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed[0]["core_compiler"][0], Value::from("gcc@9.2.0"));
    }

    #[test]
    fn matrix_rows_are_nested_sequences() {
        let mut matrix = Matrix::of(&["$packages", "$%compilers"]);
        matrix.push_row("$^mpis");
        let text = serde_yaml::to_string(&SpecEntry::Matrix(matrix)).unwrap();
        let parsed: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed["matrix"][2][0], Value::from("$^mpis"));
        assert!(parsed.get("exclude").is_none());
    }

    #[test]
    fn module_defaults_cover_root_and_lib() {
        let defaults = ModuleDefaults::default();
        assert_eq!(defaults.environment.set.len(), 5);
        assert_eq!(
            defaults.environment.set.get("\"{name}_ROOT\""),
            Some(&Value::from("\"{prefix}\""))
        );
    }
}
