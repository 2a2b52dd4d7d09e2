//! RESP charge fitting: Gaussian log → AMBER prep template + frcmod.

use crate::config::Config;
use crate::error::Result;
use crate::gaussian;
use crate::paths;
use crate::system::SystemDir;
use crate::tool_runner::{self, ToolCommand};
use crate::types::JobStatus;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FitOutcome {
    Fitted,
    UpToDate,
    NotReady { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub system: String,
    #[serde(flatten)]
    pub outcome: FitOutcome,
}

impl FitReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, FitOutcome::Failed { .. })
    }
}

pub fn antechamber_command(config: &Config, system: &SystemDir) -> ToolCommand {
    ToolCommand::new(&config.tools.antechamber)
        .args(["-i", paths::LIG_LOG, "-fi", "gout"])
        .args(["-o", paths::LIG_PREP, "-fo", "prepi", "-c", "resp"])
        .cwd(paths::ligprep_dir(&system.path))
}

pub fn parmchk_command(config: &Config, system: &SystemDir) -> ToolCommand {
    ToolCommand::new(&config.tools.parmchk2)
        .args(["-i", paths::LIG_PREP, "-f", "prepi"])
        .args(["-o", paths::LIG_FRCMOD, "-a", "y"])
        .cwd(paths::ligprep_dir(&system.path))
}

/// Fit charges for every ligand whose Gaussian job completed normally.
///
/// Systems already holding both outputs are skipped unless `force`. A failure
/// in one system is recorded in its report and does not stop the batch.
pub fn fit_all(config: &Config, systems: &[SystemDir], force: bool) -> Vec<FitReport> {
    systems
        .iter()
        .filter(|s| s.has_ligand())
        .map(|system| FitReport {
            system: system.name.clone(),
            outcome: fit_one(config, system, force),
        })
        .collect()
}

fn fit_one(config: &Config, system: &SystemDir, force: bool) -> FitOutcome {
    let prep = system.ligprep(paths::LIG_PREP);
    let frcmod = system.ligprep(paths::LIG_FRCMOD);
    if !force && prep.exists() && frcmod.exists() {
        return FitOutcome::UpToDate;
    }

    let log = system.ligprep(paths::LIG_LOG);
    match gaussian::read_log_status(&log) {
        Ok(JobStatus::Completed) => {}
        Ok(status) => {
            return FitOutcome::NotReady {
                reason: format!("{} is {status}", paths::LIG_LOG),
            }
        }
        Err(_) => {
            return FitOutcome::NotReady {
                reason: format!("{} not found", paths::LIG_LOG),
            }
        }
    }

    match run_fit(config, system) {
        Ok(()) => {
            tracing::info!(system = %system.name, "generated {} and {}", paths::LIG_PREP, paths::LIG_FRCMOD);
            FitOutcome::Fitted
        }
        Err(e) => {
            tracing::error!(system = %system.name, "charge fit failed: {e}");
            FitOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn run_fit(config: &Config, system: &SystemDir) -> Result<()> {
    tool_runner::run(&antechamber_command(config, system), None)?;
    tool_runner::run(&parmchk_command(config, system), None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn ligand_system(root: &Path, log: Option<&str>) -> SystemDir {
        let dir = root.join("system1");
        std::fs::create_dir_all(dir.join("ligprep")).unwrap();
        std::fs::write(dir.join("lig.sdf"), "").unwrap();
        if let Some(content) = log {
            std::fs::write(dir.join("ligprep/lig.log"), content).unwrap();
        }
        SystemDir::new(dir)
    }

    #[test]
    fn commands_target_ligprep() {
        let cfg = Config::default();
        let system = SystemDir::new("/p/system1");
        let ac = antechamber_command(&cfg, &system);
        assert_eq!(ac.args, ["-i", "lig.log", "-fi", "gout", "-o", "lig.prep", "-fo", "prepi", "-c", "resp"]);
        let pc = parmchk_command(&cfg, &system);
        assert_eq!(pc.program, "parmchk2");
        assert_eq!(pc.args, ["-i", "lig.prep", "-f", "prepi", "-o", "lig.frcmod", "-a", "y"]);
        assert_eq!(pc.cwd.as_deref(), Some(Path::new("/p/system1/ligprep")));
    }

    #[test]
    fn running_job_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let systems = vec![ligand_system(dir.path(), Some(" Step 4\n"))];
        let reports = fit_all(&Config::default(), &systems, false);
        assert!(matches!(reports[0].outcome, FitOutcome::NotReady { .. }));
    }

    #[test]
    fn missing_log_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let systems = vec![ligand_system(dir.path(), None)];
        let reports = fit_all(&Config::default(), &systems, false);
        match &reports[0].outcome {
            FitOutcome::NotReady { reason } => assert!(reason.contains("not found")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn existing_outputs_are_up_to_date_unless_forced() {
        let dir = TempDir::new().unwrap();
        let system = ligand_system(dir.path(), Some("Normal termination\n"));
        std::fs::write(system.ligprep("lig.prep"), "").unwrap();
        std::fs::write(system.ligprep("lig.frcmod"), "").unwrap();
        let mut cfg = Config::default();
        cfg.tools.antechamber = "true".to_string();
        cfg.tools.parmchk2 = "true".to_string();

        let reports = fit_all(&cfg, std::slice::from_ref(&system), false);
        assert!(matches!(reports[0].outcome, FitOutcome::UpToDate));

        let reports = fit_all(&cfg, std::slice::from_ref(&system), true);
        assert!(matches!(reports[0].outcome, FitOutcome::Fitted));
    }

    #[test]
    fn tool_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let systems = vec![ligand_system(dir.path(), Some("Normal termination\n"))];
        let mut cfg = Config::default();
        cfg.tools.antechamber = "false".to_string();
        let reports = fit_all(&cfg, &systems, false);
        assert!(reports[0].failed());
    }
}
