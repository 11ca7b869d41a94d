//! Error taxonomy.
//!
//! Operations return `anyhow::Result`. These types are either the root error
//! (`bail!(InstallError::ExhaustedRetries { .. })`) or attached as context
//! (`.context(RegistryError::Write { .. })`), so callers can `downcast_ref`
//! to tell the failure classes apart.

use std::path::PathBuf;

use thiserror::Error;

/// Host or workspace prerequisites are missing.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("spack executable not found (set SPACK_BIN or put spack on PATH)")]
    SpackNotFound,

    #[error("SPACK_BIN points to a non-existent path '{}'", .0.display())]
    InvalidSpackBin(PathBuf),

    #[error("project space '{}' does not exist; run `spack-cm setup` first", .0.display())]
    MissingProject(PathBuf),

    #[error("platform space '{}' does not exist; run `spack-cm setup` first", .0.display())]
    MissingPlatform(PathBuf),

    #[error("unable to create {what} '{}'", .path.display())]
    Create { what: &'static str, path: PathBuf },

    #[error("unable to detect the system compiler")]
    SystemCompiler,
}

/// Environment documents could not be built or written.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unable to generate environment documents for project '{project}'")]
    Documents { project: String },

    #[error("unable to write environment document '{}'", .0.display())]
    Write(PathBuf),
}

/// A phase could not be installed.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{phase} install failed after {attempts} attempt(s)")]
    ExhaustedRetries { phase: String, attempts: u32 },

    #[error("{phase} module generation failed")]
    ModuleGeneration { phase: String },

    #[error("cleanup before {phase} attempt {attempt} failed")]
    Cleanup { phase: String, attempt: u32 },

    #[error("unable to register compiler '{0}' with spack")]
    CompilerRegistration(String),
}

/// The package registry could not be produced from the install index.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unable to read install index '{}'", .0.display())]
    Index(PathBuf),

    #[error("malformed install index '{}': {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("unable to write package registry '{}'", .0.display())]
    Write(PathBuf),

    #[error("unable to write compiler registry '{}'", .0.display())]
    Compilers(PathBuf),
}

/// Invalid CLI arguments or manifest values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("install root '{}' is not an existing directory", .0.display())]
    InvalidRoot(PathBuf),

    #[error("manifest '{}' not found", .0.display())]
    MissingManifest(PathBuf),

    #[error("manifest key '{key}' must be a string or a list of strings")]
    InvalidValue { key: String },

    #[error("invalid settings file '{}'", .0.display())]
    Settings(PathBuf),
}
