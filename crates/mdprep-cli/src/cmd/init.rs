use crate::output::print_json;
use anyhow::Context;
use mdprep_core::{config::Config, mdp, paths, system, PrepError};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Initializing mdprep in: {}", root.display());
    }

    // 1. Write mdprep.yaml if missing
    let config_path = paths::config_path(root);
    let config_created = !config_path.exists();
    if config_created {
        Config::default().save(root).context("failed to write mdprep.yaml")?;
    }
    if !json {
        let verb = if config_created { "created:" } else { "exists: " };
        println!("  {verb} {}", paths::CONFIG_FILE);
    }

    // 2. System subfolders and mdp templates
    let systems = match system::discover_systems(root) {
        Ok(s) => s,
        Err(PrepError::NoSystems(_)) => {
            if json {
                print_json(&serde_json::json!({
                    "config_created": config_created,
                    "systems": [],
                    "mdp_written": [],
                }))?;
            } else {
                println!("\nNo system* folders yet. Add one per system (receptor .pdb, optional ligand .sdf) and re-run init.");
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to scan for systems"),
    };
    system::prepare_system_directories(&systems).context("failed to create system subfolders")?;
    let written = mdp::install_defaults(&systems).context("failed to write mdp templates")?;

    if json {
        print_json(&serde_json::json!({
            "config_created": config_created,
            "systems": systems.iter().map(|s| &s.name).collect::<Vec<_>>(),
            "mdp_written": written,
        }))?;
        return Ok(());
    }

    for s in &systems {
        println!("  ready:   {}/{{{}}}", s.name, paths::SYSTEM_SUBDIRS.join(","));
    }
    for path in &written {
        let shown = path.strip_prefix(root).unwrap_or(path);
        println!("  created: {}", shown.display());
    }
    println!("\nNext: mdprep status");
    Ok(())
}
