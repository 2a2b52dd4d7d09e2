use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use mdprep_core::{config::Config, equilibrate, equilibrate::EquilOutcome, system};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let reports = rt.block_on(equilibrate::run_pool(&config, root, &systems))?;

    if json {
        print_json(&reports)?;
    } else {
        let rows = reports
            .iter()
            .map(|r| {
                let (result, detail) = match &r.outcome {
                    EquilOutcome::Completed {
                        stages_run,
                        stages_skipped,
                    } => (
                        "completed".to_string(),
                        format!("{} run, {} resumed", stages_run.len(), stages_skipped.len()),
                    ),
                    EquilOutcome::Failed { stage, error } => (format!("failed at {stage}"), error.clone()),
                    EquilOutcome::Skipped { reason } => ("skipped".to_string(), reason.clone()),
                };
                vec![r.system.clone(), or_dash(r.gpu), result, detail]
            })
            .collect();
        print_table(&["SYSTEM", "GPU", "RESULT", "DETAIL"], rows);
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.failed())
        .map(|r| r.system.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("equilibration failed for: {}", failed.join(", "));
    }
    Ok(())
}
