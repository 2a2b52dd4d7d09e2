//! Multi-GPU equilibration: energy minimisation followed by NVT/NPT cycles
//! with a growing timestep.
//!
//! One worker task per configured GPU pulls systems from a shared queue,
//! largest first. Every grompp/mdrun a worker launches is pinned to its GPU
//! through `CUDA_VISIBLE_DEVICES`. Stages that already produced a `.gro` are
//! skipped, so an interrupted run resumes where it stopped.

use crate::config::Config;
use crate::error::{PrepError, Result};
use crate::io;
use crate::mdp;
use crate::paths;
use crate::system::SystemDir;
use crate::tool_runner::{self, ToolCommand};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Stage plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EquilStage {
    /// Directory and file stem: `em`, `nvt1`, `npt1`, ...
    pub name: String,
    /// Template under `mdp/`: `em`, `nvt` or `npt`.
    pub kind: &'static str,
    pub dt: f64,
    /// Starting coordinates.
    pub input: PathBuf,
}

impl EquilStage {
    pub fn dir(&self, system: &Path) -> PathBuf {
        system.join(&self.name)
    }

    pub fn output(&self, system: &Path) -> PathBuf {
        paths::stage_file(system, &self.name, "gro")
    }
}

/// `em`, then `nvt<c>`/`npt<c>` for each configured timestep.
pub fn stage_plan(system: &SystemDir, time_steps: &[f64]) -> Vec<EquilStage> {
    let Some(&first) = time_steps.first() else {
        return Vec::new();
    };
    let root = &system.path;
    let mut plan = vec![EquilStage {
        name: mdp::EM.to_string(),
        kind: mdp::EM,
        dt: first,
        input: system.gromacs_file(paths::GMX_GRO),
    }];
    for (i, &dt) in time_steps.iter().enumerate() {
        let cycle = i + 1;
        let previous = if cycle == 1 {
            paths::stage_file(root, mdp::EM, "gro")
        } else {
            let prev = format!("{}{}", mdp::NPT, cycle - 1);
            paths::stage_file(root, &prev, "gro")
        };
        let nvt = format!("{}{cycle}", mdp::NVT);
        let npt = format!("{}{cycle}", mdp::NPT);
        plan.push(EquilStage {
            name: nvt.clone(),
            kind: mdp::NVT,
            dt,
            input: previous,
        });
        plan.push(EquilStage {
            name: npt,
            kind: mdp::NPT,
            dt,
            input: paths::stage_file(root, &nvt, "gro"),
        });
    }
    plan
}

/// The last stage's coordinates; its presence means the system is equilibrated.
pub fn final_output(system: &Path, cycles: usize) -> PathBuf {
    if cycles == 0 {
        return paths::stage_file(system, mdp::EM, "gro");
    }
    let name = format!("{}{cycles}", mdp::NPT);
    paths::stage_file(system, &name, "gro")
}

pub fn grompp_command(config: &Config, system: &SystemDir, stage: &EquilStage) -> ToolCommand {
    let dir = stage.dir(&system.path);
    ToolCommand::new(&config.tools.gmx)
        .arg("grompp")
        .arg("-f")
        .path_arg(&dir.join(format!("{}.mdp", stage.kind)))
        .arg("-c")
        .path_arg(&stage.input)
        .arg("-r")
        .path_arg(&stage.input)
        .arg("-p")
        .path_arg(&system.gromacs_file(paths::GMX_TOP))
        .arg("-o")
        .path_arg(&dir.join(format!("{}.tpr", stage.name)))
        .cwd(dir)
}

pub fn mdrun_command(config: &Config, system: &SystemDir, stage: &EquilStage) -> ToolCommand {
    ToolCommand::new(&config.tools.gmx)
        .args(["mdrun", "-v", "-deffnm", stage.name.as_str()])
        .cwd(stage.dir(&system.path))
}

// ---------------------------------------------------------------------------
// Candidates and priority
// ---------------------------------------------------------------------------

/// Why a system cannot be equilibrated yet, if anything.
pub fn missing_inputs(system: &SystemDir) -> Option<String> {
    if !system.gromacs_file(paths::GMX_GRO).exists() {
        return Some(format!("no {}", paths::GMX_GRO));
    }
    if !paths::mdp_template(&system.path, mdp::EM).exists() {
        return Some(format!("no {}/{}.mdp", paths::MDP_DIR, mdp::EM));
    }
    None
}

/// Combined coordinate + topology size; bigger systems are started first.
pub fn priority(system: &SystemDir) -> u64 {
    io::file_size(&system.gromacs_file(paths::GMX_GRO)) + io::file_size(&system.gromacs_file(paths::GMX_TOP))
}

fn queue_by_priority(systems: Vec<SystemDir>) -> VecDeque<(u64, SystemDir)> {
    let mut ranked: Vec<(u64, SystemDir)> = systems.into_iter().map(|s| (priority(&s), s)).collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    ranked.into()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EquilOutcome {
    Completed {
        stages_run: Vec<String>,
        stages_skipped: Vec<String>,
    },
    Failed {
        stage: String,
        error: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EquilibrationReport {
    pub system: String,
    pub gpu: Option<u32>,
    #[serde(flatten)]
    pub outcome: EquilOutcome,
}

impl EquilibrationReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, EquilOutcome::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// Plain-text log file mirrored to tracing.
struct RunLog {
    path: PathBuf,
}

impl RunLog {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, level: &str, message: &str) {
        if let Err(e) = io::append_log_line(&self.path, level, message) {
            tracing::warn!("cannot write {}: {e}", self.path.display());
        }
    }

    fn info(&self, message: &str) {
        self.write("INFO", message);
    }

    fn warn(&self, message: &str) {
        self.write("WARNING", message);
    }

    fn error(&self, message: &str) {
        self.write("ERROR", message);
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn task_timeout(config: &Config) -> Option<Duration> {
    match config.equilibration.task_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

async fn run_stage(config: &Config, system: &SystemDir, stage: &EquilStage, gpu: u32) -> Result<()> {
    let dir = stage.dir(&system.path);
    io::ensure_dir(&dir)?;
    mdp::write_stage_mdp(&system.path, stage.kind, stage.dt, &dir.join(format!("{}.mdp", stage.kind)))?;

    let timeout = task_timeout(config);
    let gpu = gpu.to_string();
    for cmd in [grompp_command(config, system, stage), mdrun_command(config, system, stage)] {
        let cmd = cmd.env("CUDA_VISIBLE_DEVICES", gpu.as_str());
        let out = tool_runner::run_async(&cmd, timeout).await?;
        tracing::debug!(system = %system.name, stage = %stage.name, "{} finished in {} ms", cmd.display(), out.duration_ms);
    }
    if !stage.output(&system.path).exists() {
        return Err(PrepError::MissingInput {
            system: system.name.clone(),
            path: stage.output(&system.path),
        });
    }
    Ok(())
}

/// Run every stage of one system on `gpu`, retrying each stage up to the
/// configured attempt count.
pub async fn equilibrate_system(config: &Config, system: &SystemDir, gpu: u32) -> EquilOutcome {
    let log = RunLog::new(paths::simulation_log(&system.path));
    let attempts = config.equilibration.max_retries.max(1);
    let mut stages_run = Vec::new();
    let mut stages_skipped = Vec::new();

    log.info(&format!("starting equilibration on GPU{gpu}"));
    tracing::info!(system = %system.name, gpu, "starting equilibration");

    for stage in stage_plan(system, &config.equilibration.time_steps) {
        if stage.output(&system.path).exists() {
            log.info(&format!("{} already complete, skipping", stage.name));
            stages_skipped.push(stage.name);
            continue;
        }

        let mut last_error = None;
        for attempt in 1..=attempts {
            log.info(&format!("{} (dt = {}) attempt {attempt}/{attempts}", stage.name, stage.dt));
            match run_stage(config, system, &stage, gpu).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    log.warn(&format!("{} attempt {attempt} failed: {e}", stage.name));
                    tracing::warn!(system = %system.name, gpu, stage = %stage.name, attempt, "stage failed: {e}");
                    last_error = Some(e.to_string());
                }
            }
        }

        if let Some(error) = last_error {
            log.error(&format!("{} exceeded {attempts} attempts", stage.name));
            tracing::error!(system = %system.name, gpu, stage = %stage.name, "giving up after {attempts} attempts");
            return EquilOutcome::Failed {
                stage: stage.name,
                error,
            };
        }
        log.info(&format!("{} complete", stage.name));
        stages_run.push(stage.name);
    }

    log.info("all stages complete");
    tracing::info!(system = %system.name, gpu, "equilibration complete");
    EquilOutcome::Completed {
        stages_run,
        stages_skipped,
    }
}

/// Equilibrate `systems` across the configured GPUs.
///
/// Systems missing their inputs are reported as skipped. A failing system
/// does not stop the others.
pub async fn run_pool(config: &Config, root: &Path, systems: &[SystemDir]) -> Result<Vec<EquilibrationReport>> {
    if config.equilibration.gpus.is_empty() {
        return Err(PrepError::StageFailed {
            stage: "equilibration".to_string(),
            failures: vec!["equilibration.gpus is empty".to_string()],
        });
    }
    if config.equilibration.time_steps.is_empty() {
        return Err(PrepError::StageFailed {
            stage: "equilibration".to_string(),
            failures: vec!["equilibration.time_steps is empty".to_string()],
        });
    }

    let master = Arc::new(RunLog::new(paths::master_log_path(root)));
    let mut reports = Vec::new();
    let mut ready = Vec::new();
    for system in systems {
        match missing_inputs(system) {
            Some(reason) => {
                tracing::warn!(system = %system.name, "not ready for equilibration: {reason}");
                master.warn(&format!("{}: skipped, {reason}", system.name));
                reports.push(EquilibrationReport {
                    system: system.name.clone(),
                    gpu: None,
                    outcome: EquilOutcome::Skipped { reason },
                });
            }
            None => ready.push(system.clone()),
        }
    }
    if ready.is_empty() {
        tracing::warn!("no systems ready for equilibration");
        return Ok(reports);
    }

    let queue = queue_by_priority(ready);
    for (size, system) in &queue {
        master.info(&format!("queued {} ({size} bytes)", system.name));
    }
    let queue = Arc::new(Mutex::new(queue));
    let claimed: Arc<Mutex<Vec<(String, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let config = Arc::new(config.clone());

    let mut handles = Vec::new();
    for &gpu in &config.equilibration.gpus {
        let queue = queue.clone();
        let claimed = claimed.clone();
        let config = config.clone();
        let master = master.clone();
        handles.push(tokio::spawn(async move {
            let mut done = Vec::new();
            loop {
                let next = queue.lock().await.pop_front();
                let Some((_, system)) = next else { break };
                claimed.lock().await.push((system.name.clone(), gpu));
                master.info(&format!("{} started on GPU{gpu}", system.name));
                let outcome = equilibrate_system(&config, &system, gpu).await;
                match &outcome {
                    EquilOutcome::Failed { stage, .. } => {
                        master.error(&format!("{} failed at {stage} on GPU{gpu}", system.name))
                    }
                    _ => master.info(&format!("{} finished on GPU{gpu}", system.name)),
                }
                done.push(EquilibrationReport {
                    system: system.name.clone(),
                    gpu: Some(gpu),
                    outcome,
                });
            }
            done
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(done) => reports.extend(done),
            Err(e) => tracing::error!("equilibration worker panicked: {e}"),
        }
    }

    let leftover: Vec<String> = queue.lock().await.drain(..).map(|(_, s)| s.name).collect();
    let lost = unreported(&claimed.lock().await, &leftover, &reports);
    for report in &lost {
        if let EquilOutcome::Failed { error, .. } = &report.outcome {
            master.error(&format!("{}: {error}", report.system));
        }
    }
    reports.extend(lost);
    reports.sort_by(|a, b| a.system.cmp(&b.system));
    Ok(reports)
}

/// Failed reports for systems a worker took but never reported (its task
/// panicked) and for systems still queued after every worker stopped.
fn unreported(claimed: &[(String, u32)], leftover: &[String], reports: &[EquilibrationReport]) -> Vec<EquilibrationReport> {
    let mut lost: Vec<EquilibrationReport> = claimed
        .iter()
        .filter(|(name, _)| !reports.iter().any(|r| &r.system == name))
        .map(|(name, gpu)| EquilibrationReport {
            system: name.clone(),
            gpu: Some(*gpu),
            outcome: EquilOutcome::Failed {
                stage: "worker".to_string(),
                error: format!("worker on GPU{gpu} stopped before reporting"),
            },
        })
        .collect();
    lost.extend(leftover.iter().map(|name| EquilibrationReport {
        system: name.clone(),
        gpu: None,
        outcome: EquilOutcome::Failed {
            stage: "queue".to_string(),
            error: "no GPU worker left to run it".to_string(),
        },
    }));
    lost
}

/// Blocking entry point for callers without a runtime.
pub fn run_blocking(config: &Config, root: &Path, systems: &[SystemDir]) -> Result<Vec<EquilibrationReport>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_pool(config, root, systems))
}
