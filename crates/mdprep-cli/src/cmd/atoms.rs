use crate::output::print_json;
use mdprep_core::{atom_names, atom_names::AlignOutcome, system};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let systems = system::discover_systems(root)?;
    let reports = atom_names::align_all(&systems);

    if json {
        return print_json(&reports);
    }
    for r in &reports {
        match &r.outcome {
            AlignOutcome::Aligned(stats) => {
                println!(
                    "{}: {} atoms realigned, {} hydrogens dropped",
                    r.system, stats.updated, stats.hydrogens_dropped
                );
                for name in &stats.unmapped {
                    println!("  unmapped: {name}");
                }
                for entry in &stats.out_of_range {
                    println!("  out of range: {entry}");
                }
            }
            AlignOutcome::Skipped { reason } => println!("{}: skipped, {reason}", r.system),
        }
    }
    Ok(())
}
