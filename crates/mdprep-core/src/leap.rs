//! AMBER topology generation with tleap.
//!
//! Each system is built twice: a probe script that only reports the net
//! charge of the dry unit, then the real script that saves dry and solvated
//! topologies with enough counter-ions to neutralise that charge.

use crate::config::{Config, LeapConfig};
use crate::error::{PrepError, Result};
use crate::io;
use crate::paths;
use crate::system::SystemDir;
use crate::tool_runner::{self, ToolCommand};
use crate::types::SystemKind;
use regex::Regex;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Charge and ions
// ---------------------------------------------------------------------------

static CHARGE_RE: OnceLock<Regex> = OnceLock::new();

fn charge_re() -> &'static Regex {
    CHARGE_RE.get_or_init(|| {
        Regex::new(r"Total unperturbed charge:\s+([-+]?[0-9]*\.?[0-9]+)").expect("static regex")
    })
}

/// First `Total unperturbed charge:` value in a leap log.
pub fn parse_charge(log: &str) -> Option<f64> {
    charge_re()
        .captures_iter(log)
        .find_map(|c| c[1].parse().ok())
}

pub fn read_charge(path: &Path) -> Result<f64> {
    if !path.exists() {
        return Err(PrepError::ChargeNotFound(path.to_path_buf()));
    }
    let content = String::from_utf8_lossy(&std::fs::read(path)?).into_owned();
    parse_charge(&content).ok_or_else(|| PrepError::ChargeNotFound(path.to_path_buf()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IonPlan {
    pub ion: &'static str,
    pub count: u32,
}

/// Counter-ions that neutralise `charge`, or `None` when it rounds to zero.
/// Halves round to even.
pub fn ions_for_charge(charge: f64) -> Option<IonPlan> {
    let count = charge.abs().round_ties_even() as u32;
    if count == 0 {
        return None;
    }
    let ion = if charge > 0.0 { "Cl-" } else { "Na+" };
    Some(IonPlan { ion, count })
}

// ---------------------------------------------------------------------------
// Script rendering
// ---------------------------------------------------------------------------

fn unit_name(kind: SystemKind) -> &'static str {
    match kind {
        SystemKind::Protein => "pro",
        SystemKind::Complex => "com",
    }
}

fn preamble(leap: &LeapConfig, kind: SystemKind, pdb_name: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "source {}", leap.protein_ff);
    if kind == SystemKind::Complex {
        let _ = writeln!(s, "source {}", leap.ligand_ff);
    }
    let _ = writeln!(s, "source {}\n", leap.water_ff);
    if kind == SystemKind::Complex {
        let _ = writeln!(s, "loadamberparams ../{}/{}", paths::LIGPREP_DIR, paths::LIG_FRCMOD);
        let _ = writeln!(s, "loadamberprep ../{}/{}\n", paths::LIGPREP_DIR, paths::LIG_PREP);
        let _ = writeln!(s, "mol = loadpdb ../{}/{}", paths::LIGPREP_DIR, paths::LIG_PDB);
    }
    let _ = writeln!(s, "pro = loadpdb ../{pdb_name}");
    if kind == SystemKind::Complex {
        s.push_str("com = combine {pro mol}\n");
    }
    s
}

/// Probe script: load everything, print the charge, quit.
pub fn render_charge_probe(leap: &LeapConfig, kind: SystemKind, pdb_name: &str) -> String {
    let mut s = preamble(leap, kind, pdb_name);
    if kind == SystemKind::Complex {
        s.push('\n');
    }
    let _ = writeln!(s, "charge {}", unit_name(kind));
    s.push_str("quit\n");
    s
}

/// Full build script: dry topologies, solvation, ions, solvated topology.
pub fn render_build(leap: &LeapConfig, kind: SystemKind, pdb_name: &str, ions: Option<IonPlan>) -> String {
    let unit = unit_name(kind);
    let mut s = preamble(leap, kind, pdb_name);
    s.push('\n');
    match kind {
        SystemKind::Protein => {
            s.push_str("saveamberparm pro pro.prmtop pro.inpcrd\n");
            s.push_str("savepdb pro pro-dry.pdb\n\n");
        }
        SystemKind::Complex => {
            s.push_str("saveamberparm pro pro.prmtop pro.inpcrd\n");
            s.push_str("saveamberparm mol lig.prmtop lig.inpcrd\n");
            s.push_str("saveamberparm com native.prmtop native.inpcrd\n");
            s.push_str("savepdb com com-dry.pdb\n\n");
        }
    }
    let _ = writeln!(s, "charge {unit}");
    let _ = writeln!(s, "solvatebox {unit} {} {}", leap.water_box, leap.buffer);
    if let Some(plan) = ions {
        let _ = writeln!(s, "addionsrand {unit} {} {}", plan.ion, plan.count);
        let _ = writeln!(s, "charge {unit}");
    }
    s.push('\n');
    let (stem, pdb) = solvated_outputs(kind);
    let _ = writeln!(s, "saveamberparm {unit} {stem}.prmtop {stem}.inpcrd");
    let _ = writeln!(s, "savepdb {unit} {pdb}");
    s.push_str("quit\n");
    s
}

/// Stem of the solvated topology and the solvated PDB name, per kind.
pub fn solvated_outputs(kind: SystemKind) -> (&'static str, &'static str) {
    match kind {
        SystemKind::Protein => ("pro-sol", "pro-sol.pdb"),
        SystemKind::Complex => ("complex", "com.pdb"),
    }
}

/// Files the build script leaves in `parameters/`.
pub fn expected_outputs(kind: SystemKind) -> &'static [&'static str] {
    match kind {
        SystemKind::Protein => &[
            "pro.prmtop",
            "pro.inpcrd",
            "pro-dry.pdb",
            "pro-sol.prmtop",
            "pro-sol.inpcrd",
            "pro-sol.pdb",
        ],
        SystemKind::Complex => &[
            "pro.prmtop",
            "pro.inpcrd",
            "lig.prmtop",
            "lig.inpcrd",
            "com-dry.pdb",
            "native.prmtop",
            "native.inpcrd",
            "complex.prmtop",
            "complex.inpcrd",
            "com.pdb",
        ],
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub system: String,
    pub kind: SystemKind,
    pub receptor: String,
    pub charge: f64,
    pub ions: Option<IonPlan>,
}

fn tleap_command(config: &Config, script: &str, dir: &Path) -> ToolCommand {
    ToolCommand::new(&config.tools.tleap)
        .args(["-f", script])
        .cwd(dir)
}

/// Build topologies for every system that has a receptor PDB.
///
/// Systems without a PDB are skipped with a warning. A tleap failure or an
/// unreadable charge aborts the stage.
pub fn build_all(config: &Config, systems: &[SystemDir]) -> Result<Vec<TopologyReport>> {
    let mut reports = Vec::new();
    for system in systems {
        let Some(pdb) = system.receptor_pdb() else {
            tracing::warn!(system = %system.name, "no PDB file found, skipping");
            continue;
        };
        let pdb_name = pdb
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        reports.push(build_one(config, system, &pdb_name)?);
    }
    Ok(reports)
}

pub fn build_one(config: &Config, system: &SystemDir, pdb_name: &str) -> Result<TopologyReport> {
    let kind = system.kind();
    let dir = paths::parameters_dir(&system.path);
    io::ensure_dir(&dir)?;
    tracing::info!(system = %system.name, %kind, "receptor {pdb_name}, building {kind} topology");

    // tleap appends to leap.log; a stale log would yield an old charge.
    let log = dir.join(paths::LEAP_LOG);
    io::remove_if_exists(&log)?;

    let probe = format!("tleap_{kind}_test.in");
    io::atomic_write(&dir.join(&probe), render_charge_probe(&config.leap, kind, pdb_name).as_bytes())?;
    tool_runner::run(&tleap_command(config, &probe, &dir), None)?;
    let charge = read_charge(&log)?;
    tracing::info!(system = %system.name, charge, "detected {kind} charge");

    let ions = ions_for_charge(charge);
    match ions {
        Some(plan) => tracing::info!(system = %system.name, "adding {} {} ions", plan.count, plan.ion),
        None => tracing::info!(system = %system.name, "system is neutral, no ions required"),
    }

    let build = format!("tleap_{kind}.in");
    io::atomic_write(&dir.join(&build), render_build(&config.leap, kind, pdb_name, ions).as_bytes())?;
    tool_runner::run(&tleap_command(config, &build, &dir), None)?;

    for out in expected_outputs(kind) {
        if !dir.join(out).exists() {
            tracing::warn!(system = %system.name, "expected output {out} was not written");
        }
    }
    tracing::info!(system = %system.name, "topology written to {}", dir.display());

    Ok(TopologyReport {
        system: system.name.clone(),
        kind,
        receptor: pdb_name.to_string(),
        charge,
        ions,
    })
}
