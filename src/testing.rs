//! Scripted [`PackageManager`] for driver and installer tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_yaml::Value;

use crate::spack::{ExitOutcome, InstallFlags, PackageManager};

pub(crate) struct FakeSpack {
    pub root: PathBuf,
    /// Outcomes handed out by `install`, front first; `default_install` after that.
    pub install_script: RefCell<VecDeque<Result<ExitOutcome>>>,
    pub default_install: ExitOutcome,
    pub refresh_outcome: ExitOutcome,
    pub fail_cleanup: bool,
    pub resets: Cell<u32>,
    pub cleans: Cell<u32>,
    pub compiler_finds: Cell<u32>,
    pub external_finds: Cell<u32>,
    pub installs: RefCell<Vec<PathBuf>>,
    pub refreshes: Cell<u32>,
    pub registered: RefCell<Vec<String>>,
    pub repos: RefCell<Vec<(PathBuf, String)>>,
}

impl FakeSpack {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            install_script: RefCell::new(VecDeque::new()),
            default_install: ExitOutcome::Success,
            refresh_outcome: ExitOutcome::Success,
            fail_cleanup: false,
            resets: Cell::new(0),
            cleans: Cell::new(0),
            compiler_finds: Cell::new(0),
            external_finds: Cell::new(0),
            installs: RefCell::new(Vec::new()),
            refreshes: Cell::new(0),
            registered: RefCell::new(Vec::new()),
            repos: RefCell::new(Vec::new()),
        }
    }

    pub fn always_failing(root: &Path) -> Self {
        Self {
            default_install: ExitOutcome::Failure { code: Some(1) },
            ..Self::new(root)
        }
    }

    pub fn script(&self, outcome: Result<ExitOutcome>) {
        self.install_script.borrow_mut().push_back(outcome);
    }

    pub fn install_count(&self) -> usize {
        self.installs.borrow().len()
    }
}

fn bump(counter: &Cell<u32>) {
    counter.set(counter.get() + 1);
}

fn read_env(env_dir: &Path) -> Result<Value> {
    let text = fs::read_to_string(env_dir.join("spack.yaml"))?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Mimic what a real install leaves behind: an install index under the
/// install tree and, for the lmod environment, the shell init files.
fn fake_install_tree(env_dir: &Path) -> Result<()> {
    let doc = read_env(env_dir)?;
    let Some(root) = doc["spack"]["config"]["install_tree"]["root"].as_str() else {
        return Ok(());
    };
    let root = PathBuf::from(root);
    let db = root.join(".spack-db");
    fs::create_dir_all(&db)?;
    let index = db.join("index.json");
    if !index.exists() {
        fs::write(
            &index,
            r#"{"database": {"installs": {"h1": {"spec": {"zlib": {"version": "1.2.11", "compiler": {"name": "gcc", "version": "8.3.1"}}}, "path": "/sw/zlib"}}}}"#,
        )?;
    }
    if doc["spack"]["specs"][0].as_str() == Some("lmod") {
        let init = root.join("lmod/8.4/gcc/8.3.1/abcdefg/lmod/lmod/init");
        fs::create_dir_all(&init)?;
        fs::write(init.join("bash"), "")?;
        fs::write(init.join("csh"), "")?;
    }
    Ok(())
}

impl PackageManager for FakeSpack {
    fn root(&self) -> &Path {
        &self.root
    }

    fn reset_user_scope(&self) -> Result<()> {
        bump(&self.resets);
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        bump(&self.cleans);
        if self.fail_cleanup {
            bail!("spack clean failed with exit code: 1");
        }
        Ok(())
    }

    fn find_compilers(&self) -> Result<()> {
        bump(&self.compiler_finds);
        Ok(())
    }

    fn find_externals(&self) -> Result<()> {
        bump(&self.external_finds);
        Ok(())
    }

    fn install(&self, env_dir: &Path, _flags: InstallFlags) -> Result<ExitOutcome> {
        self.installs.borrow_mut().push(env_dir.to_path_buf());
        let outcome = self
            .install_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(self.default_install))?;
        if outcome.is_success() {
            fake_install_tree(env_dir)?;
        }
        Ok(outcome)
    }

    fn refresh_modules(&self, _env_dir: &Path) -> Result<ExitOutcome> {
        bump(&self.refreshes);
        Ok(self.refresh_outcome)
    }

    /// Appends the compiler to the environment's `compilers` list the way
    /// `spack compiler find` does.
    fn register_compiler(&self, env_dir: &Path, spec: &str) -> Result<()> {
        self.registered.borrow_mut().push(spec.to_string());
        let mut doc = read_env(env_dir)?;
        let entry: Value = serde_yaml::from_str(&format!(
            "compiler:\n  spec: {spec}\n  paths: {{cc: /sw/{spec}/bin/cc}}\n  modules: []\n"
        ))?;
        let spack = doc
            .get_mut("spack")
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| anyhow::anyhow!("no spack section"))?;
        let compilers = spack
            .entry(Value::from("compilers"))
            .or_insert_with(|| Value::Sequence(Vec::new()));
        if let Value::Sequence(list) = compilers {
            list.push(entry);
        }
        fs::write(env_dir.join("spack.yaml"), serde_yaml::to_string(&doc)?)?;
        Ok(())
    }

    fn detect_system_compiler(&self) -> Result<String> {
        Ok("gcc@8.3.1".to_string())
    }

    fn create_repo(&self, repo_dir: &Path, namespace: &str) -> Result<()> {
        fs::create_dir_all(repo_dir.join("packages"))?;
        fs::write(
            repo_dir.join("repo.yaml"),
            format!("repo:\n  namespace: {namespace}\n"),
        )?;
        self.repos
            .borrow_mut()
            .push((repo_dir.to_path_buf(), namespace.to_string()));
        Ok(())
    }
}
