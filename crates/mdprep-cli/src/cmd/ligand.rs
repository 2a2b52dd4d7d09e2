use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use mdprep_core::{
    config::Config,
    gaussian::{self, LogReport, SubmitOutcome},
    system,
    types::JobStatus,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum LigandSubcommand {
    /// Generate Gaussian inputs and launch jobs for ligands without a log
    Submit {
        /// Move failed logs aside and launch those jobs again
        #[arg(long)]
        resubmit_failed: bool,
    },

    /// Report the state of every Gaussian log
    Check,

    /// Block until every submitted job has finished
    Wait,
}

pub fn run(root: &Path, subcmd: LigandSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;

    match subcmd {
        LigandSubcommand::Submit { resubmit_failed } => {
            system::prepare_system_directories(&systems)?;
            submit(&config, &systems, resubmit_failed, json)
        }
        LigandSubcommand::Check => check(&systems, json),
        LigandSubcommand::Wait => wait(&config, &systems, json),
    }
}

fn submit(config: &Config, systems: &[system::SystemDir], resubmit_failed: bool, json: bool) -> anyhow::Result<()> {
    let reports = gaussian::submit(config, systems, resubmit_failed)?;
    if json {
        return print_json(&reports);
    }
    for r in &reports {
        match &r.outcome {
            SubmitOutcome::Submitted { pid, charge } => {
                println!("{}: submitted (pid {pid}, net charge {charge})", r.system)
            }
            SubmitOutcome::AlreadySubmitted { status } => {
                println!("{}: already submitted ({})", r.system, or_dash(*status))
            }
            SubmitOutcome::Skipped { reason } => println!("{}: skipped, {reason}", r.system),
        }
    }
    Ok(())
}

fn print_logs<'a>(reports: impl IntoIterator<Item = &'a LogReport>) {
    let rows = reports
        .into_iter()
        .map(|r| {
            vec![
                r.system.clone(),
                or_dash(r.status),
                r.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["SYSTEM", "STATUS", "ERROR"], rows);
}

fn check(systems: &[system::SystemDir], json: bool) -> anyhow::Result<()> {
    let reports = gaussian::check_logs(systems);
    if json {
        return print_json(&reports);
    }
    if reports.is_empty() {
        println!("No Gaussian logs found.");
        return Ok(());
    }

    let unfinished: Vec<&LogReport> = reports
        .iter()
        .filter(|r| r.status != Some(JobStatus::Completed))
        .collect();
    if unfinished.is_empty() {
        println!("All jobs completed.");
    } else {
        print_logs(unfinished);
    }
    Ok(())
}

fn wait(config: &Config, systems: &[system::SystemDir], json: bool) -> anyhow::Result<()> {
    let reports = gaussian::wait_for_jobs(config, systems)?;
    if json {
        print_json(&reports)?;
    } else {
        print_logs(&reports);
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.status == Some(JobStatus::Failed))
        .map(|r| r.system.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("Gaussian jobs failed: {}", failed.join(", "));
    }
    Ok(())
}
