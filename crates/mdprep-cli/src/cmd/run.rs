use crate::output::print_json;
use anyhow::Context;
use mdprep_core::{
    config::Config,
    pipeline::{self, RunOptions, RunOutcome},
    types::SystemKind,
};
use std::path::Path;

pub fn run(root: &Path, kind: &str, no_wait: bool, json: bool) -> anyhow::Result<()> {
    let kind: SystemKind = kind.parse()?;
    let config = Config::load(root).context("failed to load config")?;
    let outcome = pipeline::run(
        &config,
        root,
        RunOptions {
            kind,
            wait: !no_wait,
        },
    )
    .with_context(|| format!("{kind} workflow stopped"))?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        RunOutcome::AwaitingLigands { summary } => {
            let submitted = summary.submitted.len();
            println!("Submitted Gaussian jobs for {submitted} ligand(s).");
            println!("Check progress with `mdprep ligand check`, then re-run `mdprep run complex`.");
        }
        RunOutcome::Completed { summary } => {
            println!(
                "Workflow completed: {} system(s), {} equilibrated.",
                summary.systems.len(),
                summary
                    .equilibration
                    .iter()
                    .filter(|r| matches!(r.outcome, mdprep_core::equilibrate::EquilOutcome::Completed { .. }))
                    .count()
            );
        }
    }
    Ok(())
}
