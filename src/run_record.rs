//! Per-project record of the last `install` run.
//!
//! Written to `project/<project>/install-run.json` when a run starts and
//! rewritten when it ends, so an interrupted run is visible as `installing`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::io::write_atomic;
use crate::phase::{Phase, Stage};

static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Installing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Installed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub status: PhaseStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRunRecord {
    pub run_id: String,
    pub project: String,
    pub machine: String,
    pub stage: String,
    pub status: RunStatus,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
}

impl InstallRunRecord {
    pub fn start(project: &str, machine: &str, stage: Stage) -> Result<Self> {
        Ok(Self {
            run_id: generate_run_id()?,
            project: project.to_string(),
            machine: machine.to_string(),
            stage: stage.to_string(),
            status: RunStatus::Installing,
            created_at_utc: now_utc_compact(),
            finished_at_utc: None,
            phases: Vec::new(),
        })
    }

    pub fn record_phase(&mut self, phase: Phase, status: PhaseStatus, attempts: u32) {
        self.phases.push(PhaseRecord {
            phase: phase.to_string(),
            status,
            attempts,
        });
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.status = if succeeded {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        self.finished_at_utc = Some(now_utc_compact());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_vec_pretty(self).context("serializing install run record")?;
        write_atomic(path, &payload)
            .with_context(|| format!("writing install run record '{}'", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading install run record '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing install run record '{}'", path.display()))
    }
}

pub fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Sortable id: clock nanoseconds, pid and a per-process sequence, base62.
fn generate_run_id() -> Result<String> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before UNIX_EPOCH while generating run id")?
        .as_nanos();
    let pid = (std::process::id() as u128 & 0xFFFF) << 16;
    let seq = (RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed) as u128) & 0xFFFF;
    Ok(base62((nanos << 32) | pid | seq))
}

fn base62(mut value: u128) -> String {
    const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 62) as usize] as char);
        value /= 62;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_ids_are_unique() {
        let a = generate_run_id().unwrap();
        let b = generate_run_id().unwrap();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn base62_digits() {
        assert_eq!(base62(0), "0");
        assert_eq!(base62(61), "z");
        assert_eq!(base62(62), "10");
    }

    #[test]
    fn compact_timestamp_shape() {
        let stamp = now_utc_compact();
        assert_eq!(stamp.len(), 16);
        assert_eq!(&stamp[8..9], "T");
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn record_survives_write_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("project/demo/install-run.json");

        let mut record = InstallRunRecord::start("demo", "box", Stage::All).unwrap();
        record.write(&path).unwrap();
        assert_eq!(
            InstallRunRecord::load(&path).unwrap().status,
            RunStatus::Installing
        );

        record.record_phase(Phase::BasePackages, PhaseStatus::Skipped, 0);
        record.record_phase(Phase::Lmod, PhaseStatus::Installed, 2);
        record.finish(true);
        record.write(&path).unwrap();

        let loaded = InstallRunRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.stage, "all");
        assert_eq!(loaded.phases[1].phase, "lmod");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["status"], "success");
        assert_eq!(raw["phases"][0]["status"], "skipped");
    }
}
