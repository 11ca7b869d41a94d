//! Intel license staging inside the Spack checkout.
//!
//! Spack looks for `etc/spack/licenses/intel/license.lic` when building Intel
//! compilers. The license lives in the platform space and is only copied in for
//! the duration of an install run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::io::remove_path;

const LICENSE_FILE: &str = "license.lic";

pub fn license_dir(spack_root: &Path) -> PathBuf {
    spack_root
        .join("etc")
        .join("spack")
        .join("licenses")
        .join("intel")
}

/// Copy `<platform>/licenses/license.lic` into the Spack checkout.
///
/// Returns `false` (with a warning) when the platform space has no license.
pub fn stage_intel_license(spack_root: &Path, platform_dir: &Path) -> Result<bool> {
    let source = platform_dir.join("licenses").join(LICENSE_FILE);
    if !source.is_file() {
        warn!(
            "intel compiler requested but no license at {}",
            source.display()
        );
        return Ok(false);
    }
    let dir = license_dir(spack_root);
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating license directory '{}'", dir.display()))?;
    let target = dir.join(LICENSE_FILE);
    fs::copy(&source, &target).with_context(|| {
        format!(
            "copying license '{}' to '{}'",
            source.display(),
            target.display()
        )
    })?;
    info!("staged intel license at {}", target.display());
    Ok(true)
}

pub fn remove_intel_license(spack_root: &Path) -> Result<()> {
    let dir = license_dir(spack_root);
    if remove_path(&dir)? {
        info!("removed {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stage_then_remove() {
        let tmp = TempDir::new().unwrap();
        let spack_root = tmp.path().join("spack");
        let platform = tmp.path().join("platform/box");
        fs::create_dir_all(platform.join("licenses")).unwrap();
        fs::write(platform.join("licenses/license.lic"), "SERVER host 0\n").unwrap();

        assert!(stage_intel_license(&spack_root, &platform).unwrap());
        let staged = license_dir(&spack_root).join("license.lic");
        assert_eq!(fs::read_to_string(&staged).unwrap(), "SERVER host 0\n");

        remove_intel_license(&spack_root).unwrap();
        assert!(!license_dir(&spack_root).exists());
        assert!(spack_root.join("etc/spack/licenses").is_dir());
    }

    #[test]
    fn missing_license_is_skipped() {
        let tmp = TempDir::new().unwrap();
        assert!(!stage_intel_license(tmp.path(), &tmp.path().join("platform/box")).unwrap());
        assert!(!license_dir(tmp.path()).exists());
    }

    #[test]
    fn removing_nothing_is_fine() {
        let tmp = TempDir::new().unwrap();
        remove_intel_license(tmp.path()).unwrap();
    }
}
