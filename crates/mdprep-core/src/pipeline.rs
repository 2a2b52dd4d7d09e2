//! End-to-end preparation: every stage in order, stopping at the first one
//! that leaves a system behind.

use crate::atom_names::{self, AlignOutcome, AlignReport};
use crate::config::Config;
use crate::equilibrate::{self, EquilOutcome, EquilibrationReport};
use crate::error::{PrepError, Result};
use crate::gaussian::{self, SubmitOutcome, SubmitReport};
use crate::gromacs::{self, RestrainReport};
use crate::leap::{self, TopologyReport};
use crate::resp::{self, FitOutcome, FitReport};
use crate::system::{self, SystemDir};
use crate::types::{JobStatus, Stage, SystemKind};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub kind: SystemKind,
    /// Block until Gaussian jobs finish. Without it a complex run stops
    /// after submission.
    pub wait: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub systems: Vec<String>,
    pub submitted: Vec<SubmitReport>,
    pub fitted: Vec<FitReport>,
    pub aligned: Vec<AlignReport>,
    pub topologies: Vec<TopologyReport>,
    pub restraints: Vec<RestrainReport>,
    pub equilibration: Vec<EquilibrationReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Gaussian jobs were launched and the run was asked not to wait.
    AwaitingLigands { summary: RunSummary },
    Completed { summary: RunSummary },
}

fn stage_failed(stage: Stage, failures: Vec<String>) -> PrepError {
    PrepError::StageFailed {
        stage: stage.as_str().to_string(),
        failures,
    }
}

fn check(stage: Stage, failures: Vec<String>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(stage_failed(stage, failures))
    }
}

/// Run the whole pipeline for the project at `root`.
pub fn run(config: &Config, root: &Path, options: RunOptions) -> Result<RunOutcome> {
    let systems = system::discover_systems(root)?;
    system::prepare_system_directories(&systems)?;
    let mut summary = RunSummary {
        systems: systems.iter().map(|s| s.name.clone()).collect(),
        ..RunSummary::default()
    };
    tracing::info!("running {} pipeline over {} system(s)", options.kind, systems.len());

    if options.kind == SystemKind::Complex && !run_ligand_stages(config, &systems, options.wait, &mut summary)? {
        return Ok(RunOutcome::AwaitingLigands { summary });
    }

    tracing::info!(stage = %Stage::Topology, "building topologies");
    summary.topologies =
        leap::build_all(config, &systems).map_err(|e| stage_failed(Stage::Topology, vec![e.to_string()]))?;

    tracing::info!(stage = %Stage::Conversion, "converting and restraining");
    summary.restraints = gromacs::restrain_all(config, &systems);
    check(
        Stage::Conversion,
        summary
            .restraints
            .iter()
            .filter(|r| r.failed())
            .map(|r| r.system.clone())
            .collect(),
    )?;

    tracing::info!(stage = %Stage::Equilibration, "equilibrating");
    summary.equilibration = equilibrate::run_blocking(config, root, &systems)?;
    check(
        Stage::Equilibration,
        summary
            .equilibration
            .iter()
            .filter_map(|r| match &r.outcome {
                EquilOutcome::Failed { stage, .. } => Some(format!("{} ({stage})", r.system)),
                _ => None,
            })
            .collect(),
    )?;

    tracing::info!("workflow completed");
    Ok(RunOutcome::Completed { summary })
}

/// Stages 1-3. Returns `false` when the run should stop after submission.
fn run_ligand_stages(config: &Config, systems: &[SystemDir], wait: bool, summary: &mut RunSummary) -> Result<bool> {
    tracing::info!(stage = %Stage::LigandQm, "submitting ligand jobs");
    summary.submitted = gaussian::submit(config, systems, false)?;
    check(
        Stage::LigandQm,
        summary
            .submitted
            .iter()
            .filter_map(|r| match &r.outcome {
                SubmitOutcome::Skipped { reason } => Some(format!("{}: {reason}", r.system)),
                SubmitOutcome::AlreadySubmitted {
                    status: Some(JobStatus::Failed),
                } => Some(format!("{}: previous job failed", r.system)),
                _ => None,
            })
            .collect(),
    )?;

    if !wait {
        tracing::info!("jobs submitted; rerun once they finish");
        return Ok(false);
    }

    let logs = gaussian::wait_for_jobs(config, systems)?;
    check(
        Stage::LigandQm,
        logs.iter()
            .filter(|r| r.status != Some(JobStatus::Completed))
            .map(|r| r.system.clone())
            .collect(),
    )?;

    tracing::info!(stage = %Stage::ChargeFit, "fitting RESP charges");
    summary.fitted = resp::fit_all(config, systems, false);
    check(
        Stage::ChargeFit,
        summary
            .fitted
            .iter()
            .filter_map(|r| match &r.outcome {
                FitOutcome::Failed { error } => Some(format!("{}: {error}", r.system)),
                FitOutcome::NotReady { reason } => Some(format!("{}: {reason}", r.system)),
                _ => None,
            })
            .collect(),
    )?;

    tracing::info!(stage = %Stage::AtomNames, "aligning ligand atom names");
    let ligands: Vec<SystemDir> = systems.iter().filter(|s| s.has_ligand()).cloned().collect();
    summary.aligned = atom_names::align_all(&ligands);
    check(
        Stage::AtomNames,
        summary
            .aligned
            .iter()
            .filter_map(|r| match &r.outcome {
                AlignOutcome::Skipped { reason } => Some(format!("{}: {reason}", r.system)),
                AlignOutcome::Aligned(_) => None,
            })
            .collect(),
    )?;

    Ok(true)
}
