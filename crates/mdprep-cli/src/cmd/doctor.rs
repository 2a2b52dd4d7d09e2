use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use mdprep_core::{config::Config, tool_runner};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let checks = tool_runner::check_tools(&config);
    let missing: Vec<&str> = checks.iter().filter(|c| !c.found()).map(|c| c.role).collect();

    if json {
        print_json(&checks)?;
    } else {
        let rows = checks
            .iter()
            .map(|c| {
                vec![
                    c.role.to_string(),
                    c.executable.clone(),
                    or_dash(c.resolved.as_ref().map(|p| p.display())),
                ]
            })
            .collect();
        print_table(&["TOOL", "EXECUTABLE", "RESOLVED"], rows);
    }

    if !missing.is_empty() {
        anyhow::bail!("not found on PATH: {}", missing.join(", "));
    }
    Ok(())
}
