//! Orchestration layer over Spack for building a full software stack.
//!
//! A project manifest lists base packages, compilers, utilities, MPIs, CUDAs
//! and third-party libraries. From it this crate generates one Spack
//! environment document per install phase, installs the phases in order with
//! bounded retries, and turns each install database into a `packages.yaml`
//! registry that later phases include as externals.
//!
//! # Architecture
//!
//! ```text
//! manifest ──▶ Config ──▶ generate (one document per phase, single stacks)
//!                            │
//!                            ▼
//!                      install::Installer
//!                            │  per phase: driver (cleanup, install, retry)
//!                            ▼
//!              registry / compilers.yaml / module init script
//! ```
//!
//! Every Spack invocation goes through [`spack::PackageManager`].
//!
//! # Example
//!
//! ```rust,ignore
//! use spack_cm::{config::Config, install::{Installer, InstallOptions}};
//!
//! let spack = Spack::locate()?;
//! let config = Config::load(&workspace, "demo", "box", paths, "gcc@8.3.1", true)?;
//! Installer::new(&spack, &workspace, &config, Attempts::default(), InstallOptions::default())
//!     .run()?;
//! ```

pub mod config;
pub mod error;
pub mod generate;
pub mod install;
pub(crate) mod io;
pub mod licenses;
pub mod logging;
pub mod manifest;
pub mod module_init;
pub mod phase;
pub mod preflight;
pub mod registry;
pub mod run_record;
pub mod settings;
pub mod setup;
pub mod spack;
pub mod workspace;

#[cfg(test)]
mod testing;
