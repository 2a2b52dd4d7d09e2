use crate::output::{print_json, print_table};
use anyhow::Context;
use mdprep_core::{classifier, config::Config, system};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;
    let statuses = classifier::classify_all(&systems, &config);

    if json {
        return print_json(&statuses);
    }

    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                s.system.clone(),
                s.kind.to_string(),
                s.stage.to_string(),
                s.message.clone(),
                s.next_command.clone(),
            ]
        })
        .collect();
    print_table(&["SYSTEM", "KIND", "STAGE", "MESSAGE", "NEXT"], rows);
    Ok(())
}
