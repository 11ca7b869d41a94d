//! Optional tool settings from `<home>/spack-cm.toml`.
//!
//! ```toml
//! [spack]
//! branch = "v0.16.2"
//!
//! [logging]
//! file = "TPL-log.log"
//!
//! [attempts]
//! base_packages = 2
//! lmod = 2
//! compilers = 2
//! utilities = 2
//! tpls = 3
//! ```
//!
//! Every key is optional. CLI flags override what is set here.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::phase::Phase;

pub const DEFAULT_SPACK_BRANCH: &str = "v0.16.2";
pub const DEFAULT_LOG_FILE: &str = "TPL-log.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub spack_branch: String,
    pub log_file: PathBuf,
    pub attempts: Attempts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    pub base_packages: u32,
    pub lmod: u32,
    pub compilers: u32,
    pub utilities: u32,
    pub tpls: u32,
}

impl Attempts {
    pub fn for_phase(&self, phase: Phase) -> u32 {
        match phase {
            Phase::BasePackages => self.base_packages,
            Phase::Lmod => self.lmod,
            Phase::Compilers => self.compilers,
            Phase::Utilities => self.utilities,
            Phase::Tpls => self.tpls,
        }
    }
}

impl Default for Attempts {
    fn default() -> Self {
        Self {
            base_packages: Phase::BasePackages.default_attempts(),
            lmod: Phase::Lmod.default_attempts(),
            compilers: Phase::Compilers.default_attempts(),
            utilities: Phase::Utilities.default_attempts(),
            tpls: Phase::Tpls.default_attempts(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spack_branch: DEFAULT_SPACK_BRANCH.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            attempts: Attempts::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    spack: Option<SpackToml>,
    logging: Option<LoggingToml>,
    attempts: Option<AttemptsToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpackToml {
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingToml {
    file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttemptsToml {
    base_packages: Option<u32>,
    lmod: Option<u32>,
    compilers: Option<u32>,
    utilities: Option<u32>,
    tpls: Option<u32>,
}

/// Load settings, falling back to defaults when the file does not exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.is_file() {
        return Ok(Settings::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading settings '{}'", path.display()))?;
    parse_settings(&text).context(ConfigError::Settings(path.to_path_buf()))
}

/// Log file for this run: `--log-file`, else the settings value, else the default.
///
/// `settings` is `None` when the settings file failed to load, so the
/// failure can still be written to a log.
pub fn resolve_log_file(explicit: Option<&Path>, settings: Option<&Settings>) -> PathBuf {
    match (explicit, settings) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(settings)) => settings.log_file.clone(),
        (None, None) => PathBuf::from(DEFAULT_LOG_FILE),
    }
}

fn parse_settings(text: &str) -> Result<Settings> {
    let parsed: SettingsToml = toml::from_str(text)?;
    let mut settings = Settings::default();

    if let Some(branch) = parsed.spack.and_then(|spack| spack.branch) {
        let branch = branch.trim();
        if !branch.is_empty() {
            settings.spack_branch = branch.to_string();
        }
    }
    if let Some(file) = parsed.logging.and_then(|logging| logging.file) {
        settings.log_file = file;
    }
    if let Some(attempts) = parsed.attempts {
        let current = &mut settings.attempts;
        current.base_packages = attempts.base_packages.unwrap_or(current.base_packages);
        current.lmod = attempts.lmod.unwrap_or(current.lmod);
        current.compilers = attempts.compilers.unwrap_or(current.compilers);
        current.utilities = attempts.utilities.unwrap_or(current.utilities);
        current.tpls = attempts.tpls.unwrap_or(current.tpls);
    }
    Ok(settings)
}
