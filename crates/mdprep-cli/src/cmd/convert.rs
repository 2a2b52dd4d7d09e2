use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use mdprep_core::{
    config::Config,
    gromacs::{self, ConvertOutcome, RestrainOutcome},
    system,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConvertSubcommand {
    /// Convert AMBER files to gmx.top / gmx.gro in every system
    Amber {
        /// prmtop, relative to each system's parameters/ (or the system folder)
        prmtop: String,
        /// inpcrd, resolved the same way
        inpcrd: String,
    },

    /// Add POSRES includes and generate posre1.itp / posre2.itp
    Restrain,
}

pub fn run(root: &Path, subcmd: ConvertSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let systems = system::discover_systems(root)?;

    match subcmd {
        ConvertSubcommand::Amber { prmtop, inpcrd } => {
            let reports = gromacs::convert_all(&config, &systems, &prmtop, &inpcrd);
            if json {
                print_json(&reports)?;
            } else {
                for r in &reports {
                    match &r.outcome {
                        ConvertOutcome::Converted => println!("{}: converted", r.system),
                        ConvertOutcome::Failed { error } => println!("{}: FAILED, {error}", r.system),
                    }
                }
            }
            let failed = reports.iter().filter(|r| r.failed()).count();
            if failed > 0 {
                anyhow::bail!("conversion failed for {failed} system(s)");
            }
        }
        ConvertSubcommand::Restrain => {
            let reports = gromacs::restrain_all(&config, &systems);
            if json {
                print_json(&reports)?;
            } else {
                for r in &reports {
                    match &r.outcome {
                        RestrainOutcome::Restrained {
                            converted,
                            includes_added,
                            groups,
                        } => {
                            let added = if includes_added.is_empty() {
                                "none".to_string()
                            } else {
                                includes_added.join(", ")
                            };
                            println!(
                                "{}: restrained{} (includes added: {added}; MOL atoms: {})",
                                r.system,
                                if *converted { ", converted from AMBER" } else { "" },
                                groups
                                    .ligand_atoms
                                    .map(|n| n.to_string())
                                    .unwrap_or_else(|| "none".to_string()),
                            );
                        }
                        RestrainOutcome::Skipped { reason } => println!("{}: skipped, {reason}", r.system),
                        RestrainOutcome::Failed { error } => println!("{}: FAILED, {error}", r.system),
                    }
                }
            }
            let failed = reports.iter().filter(|r| r.failed()).count();
            if failed > 0 {
                anyhow::bail!("restraint setup failed for {failed} system(s)");
            }
        }
    }
    Ok(())
}
