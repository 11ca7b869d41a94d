//! Bounded install retry loop for one phase.
//!
//! ```text
//! Idle ──copy document──▶ Attempting(0)
//! Attempting(n) ──cleanup, install ok──▶ Success(n+1) ──modules──▶ done
//! Attempting(n) ──cleanup, install failed──▶ re-copy, Attempting(n+1)
//! Attempting(max) ──▶ ExhaustedRetries
//! ```
//!
//! Cleanup runs before every attempt, the first one included. Only the
//! install itself is retried; cleanup and module generation failures abort
//! the phase.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, error, info, warn};

use super::cleanup;
use crate::error::InstallError;
use crate::phase::Phase;
use crate::spack::{ExitOutcome, InstallFlags, PackageManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    /// Attempts made so far.
    Attempting(u32),
    Success(u32),
    ExhaustedRetries(u32),
}

#[derive(Debug, Clone)]
pub struct PhaseRun<'a> {
    pub phase: Phase,
    /// Generated document for the phase.
    pub document: &'a Path,
    /// The environment's `spack.yaml`.
    pub active: &'a Path,
    pub max_attempts: u32,
    pub generate_modules: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriverOptions {
    pub flags: InstallFlags,
    /// Run `spack external find` during cleanup.
    pub external: bool,
}

/// Install one phase; returns the number of attempts it took.
pub fn install_phase(pm: &dyn PackageManager, run: &PhaseRun, options: DriverOptions) -> Result<u32> {
    let result = drive(pm, run, options);
    if let Err(err) = &result {
        error!("{:#}", err);
    }
    result
}

fn drive(pm: &dyn PackageManager, run: &PhaseRun, options: DriverOptions) -> Result<u32> {
    let env_dir = run
        .active
        .parent()
        .ok_or_else(|| anyhow!("environment document without parent '{}'", run.active.display()))?;

    let mut state = AttemptState::Idle;
    loop {
        state = match state {
            AttemptState::Idle => {
                activate(run)?;
                info!(
                    "installing {} from {} ({} attempt(s) allowed)",
                    run.phase,
                    run.document.display(),
                    run.max_attempts
                );
                AttemptState::Attempting(0)
            }
            AttemptState::Attempting(made) if made >= run.max_attempts => {
                AttemptState::ExhaustedRetries(made)
            }
            AttemptState::Attempting(made) => {
                let attempt = made + 1;
                cleanup::prepare_attempt(pm, env_dir, options.external).context(
                    InstallError::Cleanup {
                        phase: run.phase.to_string(),
                        attempt,
                    },
                )?;
                log_active_document(run.active);

                let failure = match pm.install(env_dir, options.flags) {
                    Ok(ExitOutcome::Success) => None,
                    Ok(ExitOutcome::Failure { code }) => {
                        Some(format!("exit code {}", code.unwrap_or(-1)))
                    }
                    Err(err) => Some(format!("{:#}", err)),
                };
                match failure {
                    None => AttemptState::Success(attempt),
                    Some(reason) => {
                        warn!(
                            "{} install failed ({}); attempt: {}/{}",
                            run.phase, reason, attempt, run.max_attempts
                        );
                        activate(run)?;
                        AttemptState::Attempting(attempt)
                    }
                }
            }
            AttemptState::Success(attempts) => {
                if run.generate_modules {
                    info!("generating {} module files", run.phase);
                    let refreshed = pm.refresh_modules(env_dir).context(
                        InstallError::ModuleGeneration {
                            phase: run.phase.to_string(),
                        },
                    )?;
                    if !refreshed.is_success() {
                        bail!(InstallError::ModuleGeneration {
                            phase: run.phase.to_string()
                        });
                    }
                }
                info!("{} installed after {} attempt(s)", run.phase, attempts);
                return Ok(attempts);
            }
            AttemptState::ExhaustedRetries(attempts) => {
                bail!(InstallError::ExhaustedRetries {
                    phase: run.phase.to_string(),
                    attempts,
                });
            }
        };
    }
}

/// Copy the phase document over the environment's `spack.yaml`.
fn activate(run: &PhaseRun) -> Result<()> {
    fs::copy(run.document, run.active).with_context(|| {
        format!(
            "copying '{}' to '{}'",
            run.document.display(),
            run.active.display()
        )
    })?;
    Ok(())
}

fn log_active_document(path: &Path) {
    match fs::read_to_string(path) {
        Ok(text) => debug!("{}:\n{}", path.display(), text),
        Err(err) => debug!("cannot read {}: {}", path.display(), err),
    }
}
