use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use mdprep_core::{config::Config, leap, system};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;
    system::prepare_system_directories(&systems)?;
    let reports = leap::build_all(&config, &systems)?;

    if json {
        return print_json(&reports);
    }
    let rows = reports
        .iter()
        .map(|r| {
            vec![
                r.system.clone(),
                r.kind.to_string(),
                r.receptor.clone(),
                format!("{:.3}", r.charge),
                or_dash(r.ions.map(|i| format!("{} x{}", i.ion, i.count))),
            ]
        })
        .collect();
    print_table(&["SYSTEM", "KIND", "RECEPTOR", "CHARGE", "IONS"], rows);
    Ok(())
}
