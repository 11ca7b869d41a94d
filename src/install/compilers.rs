//! Compiler registry written after the compilers phase.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_yaml::Value;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::io::write_atomic;
use crate::spack::PackageManager;

const REGISTRY_FILE: &str = "compilers.yaml";

#[derive(Debug, Serialize)]
struct CompilerRegistry {
    compilers: Vec<Value>,
}

/// Register every built compiler with Spack, then copy the environment's
/// `compilers` section to `<output_dir>/compilers.yaml`.
pub fn write_compiler_registry(
    pm: &dyn PackageManager,
    env_dir: &Path,
    active: &Path,
    compilers: &[String],
    output_dir: &Path,
) -> Result<PathBuf> {
    for spec in compilers {
        info!("registering compiler {}", spec);
        pm.register_compiler(env_dir, spec)?;
    }

    let path = output_dir.join(REGISTRY_FILE);
    let mut entries = read_compilers(active)?;
    for entry in &mut entries {
        truncate_intel_spec(entry);
    }
    if entries.is_empty() {
        warn!("no compilers registered in {}", active.display());
    }

    let yaml = serde_yaml::to_string(&CompilerRegistry { compilers: entries })
        .context(RegistryError::Compilers(path.clone()))?;
    fs::create_dir_all(output_dir).context(RegistryError::Compilers(path.clone()))?;
    write_atomic(&path, yaml.as_bytes()).context(RegistryError::Compilers(path.clone()))?;
    info!("wrote compiler registry {}", path.display());
    Ok(path)
}

fn read_compilers(active: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(active)
        .with_context(|| format!("reading '{}'", active.display()))?;
    let doc: Value = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing '{}'", active.display()))?;
    match &doc["spack"]["compilers"] {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(list) => Ok(list.clone()),
        _ => Err(anyhow!(
            "'spack.compilers' in '{}' is not a list",
            active.display()
        )),
    }
}

/// Intel compilers register with a four-part version (`intel@19.0.5.281`)
/// but are requested by three parts.
fn truncate_intel_spec(entry: &mut Value) {
    let Some(spec) = entry
        .get_mut("compiler")
        .and_then(|compiler| compiler.get_mut("spec"))
    else {
        return;
    };
    let Some(text) = spec.as_str() else {
        return;
    };
    if !text.contains("intel") {
        return;
    }
    let truncated = text.split('.').take(3).collect::<Vec<_>>().join(".");
    *spec = Value::from(truncated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSpack;
    use tempfile::TempDir;

    #[test]
    fn truncates_intel_versions_only() {
        let mut intel: Value =
            serde_yaml::from_str("compiler:\n  spec: intel@19.0.5.281\n").unwrap();
        let mut gcc: Value = serde_yaml::from_str("compiler:\n  spec: gcc@10.1.0\n").unwrap();
        truncate_intel_spec(&mut intel);
        truncate_intel_spec(&mut gcc);
        assert_eq!(intel["compiler"]["spec"], Value::from("intel@19.0.5"));
        assert_eq!(gcc["compiler"]["spec"], Value::from("gcc@10.1.0"));
    }

    #[test]
    fn registers_and_copies_compilers_section() {
        let tmp = TempDir::new().unwrap();
        let env_dir = tmp.path().join("project/demo");
        fs::create_dir_all(&env_dir).unwrap();
        let active = env_dir.join("spack.yaml");
        fs::write(&active, "spack:\n  specs: [gcc@10.1.0]\n").unwrap();
        let output = tmp.path().join("install/compiler");

        let spack = FakeSpack::new(tmp.path());
        let compilers = vec!["gcc@10.1.0".to_string(), "intel@19.0.5.281".to_string()];
        let path = write_compiler_registry(&spack, &env_dir, &active, &compilers, &output).unwrap();

        assert_eq!(*spack.registered.borrow(), compilers);
        let parsed: Value = serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        let list = parsed["compilers"].as_sequence().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["compiler"]["spec"], Value::from("gcc@10.1.0"));
        assert_eq!(list[1]["compiler"]["spec"], Value::from("intel@19.0.5"));
        assert_eq!(
            list[0]["compiler"]["paths"]["cc"],
            Value::from("/sw/gcc@10.1.0/bin/cc")
        );
    }

    #[test]
    fn missing_section_writes_empty_registry() {
        let tmp = TempDir::new().unwrap();
        let active = tmp.path().join("spack.yaml");
        fs::write(&active, "spack:\n  specs: []\n").unwrap();
        let spack = FakeSpack::new(tmp.path());

        let path = write_compiler_registry(&spack, tmp.path(), &active, &[], tmp.path()).unwrap();
        let parsed: Value = serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["compilers"], Value::Sequence(Vec::new()));
    }
}
