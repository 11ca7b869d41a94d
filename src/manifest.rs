//! Project manifest parsing.
//!
//! `<project>-manifest.yaml` is a flat mapping of `SPACK_CM_*` keys to a
//! string or a list of strings. Empty values load as the `[""]` sentinel.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_yaml::Value;
use tracing::warn;

use crate::error::ConfigError;

pub const BASE_PACKAGES: &str = "SPACK_CM_BASE_PACKAGES";
pub const BASE_COMPILER: &str = "SPACK_CM_BASE_COMPILER";
pub const COMPILERS: &str = "SPACK_CM_COMPILERS";
pub const EXTERNAL_COMPILERS: &str = "SPACK_CM_EXTERNAL_COMPILERS";
pub const UTILITIES: &str = "SPACK_CM_UTILITIES";
pub const UTILITY_COMPILER: &str = "SPACK_CM_UTILITY_COMPILER";
pub const MPIS: &str = "SPACK_CM_MPIS";
pub const EXTERNAL_MPIS: &str = "SPACK_CM_EXTERNAL_MPIS";
pub const CUDAS: &str = "SPACK_CM_CUDAS";
pub const EXTERNAL_CUDAS: &str = "SPACK_CM_EXTERNAL_CUDAS";
pub const TPLS: &str = "SPACK_CM_TPLS";
pub const EXCLUDE_COMBOS: &str = "SPACK_CM_EXCLUDE_COMBOS";

/// Every key the manifest understands, in template order.
pub const KNOWN_KEYS: &[&str] = &[
    BASE_PACKAGES,
    BASE_COMPILER,
    COMPILERS,
    EXTERNAL_COMPILERS,
    UTILITIES,
    UTILITY_COMPILER,
    MPIS,
    EXTERNAL_MPIS,
    CUDAS,
    EXTERNAL_CUDAS,
    TPLS,
    EXCLUDE_COMBOS,
];

/// An ordered list of package specs as loaded from the manifest.
///
/// An empty manifest value is stored as `[""]`; [`SpecList::is_absent`] treats
/// that and a truly empty list the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecList(Vec<String>);

impl SpecList {
    pub fn absent() -> Self {
        Self(vec![String::new()])
    }

    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            Self::absent()
        } else {
            Self(items)
        }
    }

    pub fn is_absent(&self) -> bool {
        self.0.iter().all(|item| item.is_empty())
    }

    /// Non-empty entries in manifest order.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries().map(str::to_string).collect()
    }

    /// Values exactly as loaded, sentinel included.
    pub fn raw(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().any(|item| item.contains(needle))
    }

    /// Non-empty entries of `self` followed by those of `other`.
    pub fn chain(&self, other: &SpecList) -> Vec<String> {
        self.entries().chain(other.entries()).map(str::to_string).collect()
    }
}

impl Default for SpecList {
    fn default() -> Self {
        Self::absent()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    values: BTreeMap<String, SpecList>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!(ConfigError::MissingManifest(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing manifest '{}'", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let blank = text
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'));
        if blank {
            return Ok(Self::default());
        }
        let mapping = match serde_yaml::from_str::<Value>(text).context("invalid YAML")? {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Ok(Self::default()),
            _ => bail!("manifest is not a YAML mapping"),
        };
        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let Some(key) = key.as_str().map(str::to_string) else {
                bail!("manifest keys must be strings");
            };
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warn!("ignoring unknown manifest key '{}'", key);
                continue;
            }
            let list = spec_list_from_value(&key, &value)?;
            values.insert(key, list);
        }
        Ok(Self { values })
    }

    /// Value for `key`; missing keys read as the sentinel.
    pub fn get(&self, key: &str) -> SpecList {
        self.values.get(key).cloned().unwrap_or_default()
    }
}

fn spec_list_from_value(key: &str, value: &Value) -> Result<SpecList> {
    let items = match value {
        Value::Null => Vec::new(),
        Value::String(s) => split_scalar(s),
        Value::Sequence(seq) => {
            let mut items = Vec::with_capacity(seq.len());
            for item in seq {
                match scalar_to_string(item) {
                    Some(s) => items.push(s.trim().to_string()),
                    None => bail!(ConfigError::InvalidValue {
                        key: key.to_string()
                    }),
                }
            }
            items
        }
        other => match scalar_to_string(other) {
            Some(s) => vec![s],
            None => bail!(ConfigError::InvalidValue {
                key: key.to_string()
            }),
        },
    };
    Ok(SpecList::new(items))
}

fn split_scalar(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
