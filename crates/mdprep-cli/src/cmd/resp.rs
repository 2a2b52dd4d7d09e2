use crate::output::print_json;
use anyhow::Context;
use mdprep_core::{config::Config, resp, resp::FitOutcome, system};
use std::path::Path;

pub fn run(root: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;
    let reports = resp::fit_all(&config, &systems, force);

    if json {
        print_json(&reports)?;
    } else if reports.is_empty() {
        println!("No ligand systems found.");
    } else {
        for r in &reports {
            match &r.outcome {
                FitOutcome::Fitted => println!("{}: fitted", r.system),
                FitOutcome::UpToDate => println!("{}: up to date", r.system),
                FitOutcome::NotReady { reason } => println!("{}: not ready, {reason}", r.system),
                FitOutcome::Failed { error } => println!("{}: FAILED, {error}", r.system),
            }
        }
    }

    let failures = reports.iter().filter(|r| r.failed()).count();
    if failures > 0 {
        anyhow::bail!("charge fitting failed for {failures} system(s)");
    }
    Ok(())
}
