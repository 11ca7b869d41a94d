//! Per-attempt environment reset.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::io::remove_path;
use crate::spack::PackageManager;

/// State Spack leaves in the environment directory between attempts.
const STALE_ENV_STATE: &[&str] = &["spack.lock", ".spack-env"];

/// Reset user scope and environment state, then let Spack rediscover
/// compilers (and externals when asked).
pub fn prepare_attempt(pm: &dyn PackageManager, env_dir: &Path, external: bool) -> Result<()> {
    info!("cleaning up spack state for {}", env_dir.display());
    pm.reset_user_scope()?;
    for name in STALE_ENV_STATE {
        let path = env_dir.join(name);
        if remove_path(&path)? {
            debug!("removed {}", path.display());
        }
    }
    pm.clean()?;
    pm.find_compilers()?;
    if external {
        pm.find_externals()?;
    }
    Ok(())
}
