//! Ligand quantum-chemistry stage: Gaussian input generation, job
//! submission, log classification and completion polling.
//!
//! Job state is never recorded anywhere except the Gaussian log itself:
//! a missing `lig.log` means "not submitted", and the log's termination
//! banner says whether the job finished.

use crate::config::Config;
use crate::error::{PrepError, Result};
use crate::paths;
use crate::sdf;
use crate::system::SystemDir;
use crate::tool_runner::{self, ToolCommand};
use crate::types::JobStatus;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Log classification
// ---------------------------------------------------------------------------

/// Classify a Gaussian log. `Error termination` anywhere wins over the last line.
pub fn classify_log(content: &str) -> JobStatus {
    if content.contains("Error termination") {
        return JobStatus::Failed;
    }
    let last = content
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if last.starts_with("Normal termination") {
        JobStatus::Completed
    } else {
        JobStatus::Running
    }
}

pub fn read_log_status(path: &Path) -> Result<JobStatus> {
    let bytes = std::fs::read(path)?;
    Ok(classify_log(&String::from_utf8_lossy(&bytes)))
}

#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    pub system: String,
    pub log: PathBuf,
    /// `None` when the log could not be read.
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status of every ligand log across `systems`. Systems without a log are omitted.
pub fn check_logs(systems: &[SystemDir]) -> Vec<LogReport> {
    systems
        .iter()
        .filter_map(|system| {
            let log = system.ligprep(paths::LIG_LOG);
            if !log.exists() {
                return None;
            }
            let report = match read_log_status(&log) {
                Ok(status) => LogReport {
                    system: system.name.clone(),
                    log,
                    status: Some(status),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(system = %system.name, "error reading {}: {e}", log.display());
                    LogReport {
                        system: system.name.clone(),
                        log,
                        status: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            Some(report)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Input generation
// ---------------------------------------------------------------------------

/// antechamber invocation turning the ligand SDF into a Gaussian input in `ligprep/`.
pub fn gjf_command(config: &Config, system: &SystemDir, sdf: &Path, charge: i32) -> ToolCommand {
    let g = &config.gaussian;
    ToolCommand::new(&config.tools.antechamber)
        .arg("-i")
        .path_arg(sdf)
        .args(["-fi", "sdf", "-o", paths::LIG_GJF, "-fo", "gcrt"])
        .args(["-at", g.atom_type.as_str()])
        .args(["-gn".to_string(), format!("%nproc={}", g.nproc)])
        .args(["-gm".to_string(), format!("%mem={}", g.memory)])
        .args(["-gk", g.route.as_str()])
        .args(["-rn", g.residue_name.as_str()])
        .args(["-nc".to_string(), charge.to_string()])
        .cwd(paths::ligprep_dir(&system.path))
}

pub fn gaussian_command(config: &Config, system: &SystemDir) -> ToolCommand {
    ToolCommand::new(&config.tools.gaussian)
        .arg(paths::LIG_GJF)
        .cwd(paths::ligprep_dir(&system.path))
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Submitted { pid: u32, charge: i32 },
    AlreadySubmitted { status: Option<JobStatus> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    pub system: String,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

/// Generate inputs and launch Gaussian for every ligand that has no log yet.
///
/// With `resubmit_failed`, logs that ended in `Error termination` are moved
/// aside to `lig.log.failed` and the job is launched again. A ligand whose
/// input generation fails is reported as skipped; the batch continues.
pub fn submit(config: &Config, systems: &[SystemDir], resubmit_failed: bool) -> Result<Vec<SubmitReport>> {
    let ligands: Vec<(&SystemDir, PathBuf)> = systems
        .iter()
        .filter_map(|s| s.ligand_sdf().map(|sdf| (s, sdf)))
        .collect();
    if ligands.is_empty() {
        return Err(PrepError::NoLigands);
    }

    let mut reports = Vec::new();
    for (system, sdf) in ligands {
        let outcome = submit_one(config, system, &sdf, resubmit_failed)?;
        reports.push(SubmitReport {
            system: system.name.clone(),
            outcome,
        });
    }
    Ok(reports)
}

fn submit_one(config: &Config, system: &SystemDir, sdf: &Path, resubmit_failed: bool) -> Result<SubmitOutcome> {
    let log = system.ligprep(paths::LIG_LOG);
    if log.exists() {
        let status = read_log_status(&log).ok();
        if !(resubmit_failed && status == Some(JobStatus::Failed)) {
            return Ok(SubmitOutcome::AlreadySubmitted { status });
        }
        let aside = system.ligprep("lig.log.failed");
        std::fs::rename(&log, &aside)?;
        tracing::info!(system = %system.name, "moved failed log to {}", aside.display());
    }

    crate::io::ensure_dir(&paths::ligprep_dir(&system.path))?;
    let charge = sdf::read_formal_charge(sdf)?;

    let gjf = system.ligprep(paths::LIG_GJF);
    if let Err(e) = tool_runner::run(&gjf_command(config, system, sdf, charge), None) {
        tracing::warn!(system = %system.name, "skipping: antechamber failed: {e}");
        return Ok(SubmitOutcome::Skipped {
            reason: format!("antechamber failed: {e}"),
        });
    }
    if !gjf.exists() {
        tracing::warn!(system = %system.name, "skipping: antechamber produced no {}", paths::LIG_GJF);
        return Ok(SubmitOutcome::Skipped {
            reason: format!("{} was not produced", paths::LIG_GJF),
        });
    }

    let pid = match tool_runner::spawn_detached(&gaussian_command(config, system)) {
        Ok(pid) => pid,
        Err(e) => {
            tracing::warn!(system = %system.name, "skipping: could not start Gaussian: {e}");
            return Ok(SubmitOutcome::Skipped {
                reason: format!("could not start Gaussian: {e}"),
            });
        }
    };
    tracing::info!(system = %system.name, pid, charge, "{} submitted", paths::LIG_GJF);
    Ok(SubmitOutcome::Submitted { pid, charge })
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// Poll the ligand logs of `systems` until none is still running.
///
/// A system that has an SDF but no log yet counts as pending: Gaussian
/// creates the log shortly after start-up. Returns the final reports.
pub fn wait_for_jobs(config: &Config, systems: &[SystemDir]) -> Result<Vec<LogReport>> {
    let interval = Duration::from_secs(config.ligand.poll_interval_secs);
    let deadline = match config.ligand.max_wait_secs {
        0 => None,
        secs => Some(Instant::now() + Duration::from_secs(secs)),
    };

    loop {
        let reports = check_logs(systems);
        let pending = pending_systems(systems, &reports);
        if pending.is_empty() {
            return Ok(reports);
        }
        // The last poll lands on the deadline itself.
        let nap = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(PrepError::WaitTimeout { pending });
                }
                interval.min(left)
            }
            None => interval,
        };
        tracing::info!("waiting on {} job(s): {}", pending.len(), pending.join(", "));
        std::thread::sleep(nap);
        let reaped = tool_runner::reap_detached();
        if reaped > 0 {
            tracing::debug!("reaped {reaped} finished background job(s)");
        }
    }
}

fn pending_systems(systems: &[SystemDir], reports: &[LogReport]) -> Vec<String> {
    systems
        .iter()
        .filter(|s| s.has_ligand())
        .filter(|s| {
            match reports.iter().find(|r| r.system == s.name) {
                None => true,
                Some(r) => r.status == Some(JobStatus::Running),
            }
        })
        .map(|s| s.name.clone())
        .collect()
}
