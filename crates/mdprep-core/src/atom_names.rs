//! Restore the input heavy-atom coordinates onto antechamber's renamed ligand PDB.
//!
//! antechamber writes `NEWPDB.PDB` with its own atom names and the
//! Gaussian-optimised geometry, plus `ATOMTYPE.INF` mapping each name back to
//! the input atom index. The aligned structure `LIG.PDB` keeps the new names
//! but takes coordinates from the original SDF. Hydrogens are dropped; tleap
//! rebuilds them from the prep template.

use crate::error::Result;
use crate::io;
use crate::paths;
use crate::sdf::{self, SdfAtom};
use crate::system::SystemDir;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

static INF_RE: OnceLock<Regex> = OnceLock::new();

fn inf_re() -> &'static Regex {
    INF_RE.get_or_init(|| Regex::new(r"\[\s*(\d+)\s*\]\s*\((\S+)\s*\)").expect("static regex"))
}

/// Upper-cased atom name → 1-based input index, hydrogens excluded.
pub fn parse_atomtype_inf(content: &str) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for caps in content.lines().filter_map(|l| inf_re().captures(l)) {
        let label = caps[2].trim().to_ascii_uppercase();
        if label.starts_with('H') {
            continue;
        }
        if let Ok(index) = caps[1].parse() {
            map.insert(label, index);
        }
    }
    map
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignStats {
    pub updated: usize,
    pub unmapped: Vec<String>,
    pub out_of_range: Vec<String>,
    pub hydrogens_dropped: usize,
}

/// Rewrite `pdb` so mapped heavy atoms carry SDF coordinates.
///
/// Coordinates occupy columns 31-54 and are written as three `%8.3f` fields.
/// Records other than ATOM/HETATM pass through verbatim, as do heavy atoms
/// that cannot be mapped.
pub fn align_pdb(pdb: &str, atoms: &[SdfAtom], map: &HashMap<String, usize>) -> (String, AlignStats) {
    let mut out = String::with_capacity(pdb.len());
    let mut stats = AlignStats::default();

    for line in pdb.split_inclusive('\n') {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            out.push_str(line);
            continue;
        }
        let name = line.get(12..16).unwrap_or("").trim().to_ascii_uppercase();
        if name.starts_with('H') {
            stats.hydrogens_dropped += 1;
            continue;
        }
        let Some(&index) = map.get(&name) else {
            stats.unmapped.push(name);
            out.push_str(line);
            continue;
        };
        let Some(atom) = index.checked_sub(1).and_then(|i| atoms.get(i)) else {
            stats.out_of_range.push(format!("{name} (index {index})"));
            out.push_str(line);
            continue;
        };
        let (Some(head), Some(rest)) = (line.get(..30), line.get(54..)) else {
            stats.unmapped.push(name);
            out.push_str(line);
            continue;
        };
        let [x, y, z] = atom.position;
        out.push_str(&format!("{head}{x:8.3}{y:8.3}{z:8.3}{rest}"));
        stats.updated += 1;
    }

    (out, stats)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlignOutcome {
    Aligned(AlignStats),
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignReport {
    pub system: String,
    #[serde(flatten)]
    pub outcome: AlignOutcome,
}

/// Produce `ligprep/LIG.PDB` for every ligand system with the required inputs.
///
/// A system whose inputs cannot be read is reported as skipped; the batch
/// continues.
pub fn align_all(systems: &[SystemDir]) -> Vec<AlignReport> {
    systems
        .iter()
        .map(|system| {
            let outcome = align_one(system).unwrap_or_else(|e| {
                tracing::error!(system = %system.name, "atom-name alignment failed: {e}");
                AlignOutcome::Skipped { reason: e.to_string() }
            });
            AlignReport {
                system: system.name.clone(),
                outcome,
            }
        })
        .collect()
}

fn align_one(system: &SystemDir) -> Result<AlignOutcome> {
    let Some(sdf_path) = system.ligand_sdf() else {
        tracing::warn!(system = %system.name, "no .sdf file found, skipping");
        return Ok(AlignOutcome::Skipped {
            reason: "no .sdf file".to_string(),
        });
    };
    let newpdb = system.ligprep(paths::NEWPDB);
    let inf = system.ligprep(paths::ATOMTYPE_INF);
    if !newpdb.exists() || !inf.exists() {
        tracing::error!(system = %system.name, "missing {} or {}, skipping", paths::NEWPDB, paths::ATOMTYPE_INF);
        return Ok(AlignOutcome::Skipped {
            reason: format!("missing {} or {}", paths::NEWPDB, paths::ATOMTYPE_INF),
        });
    }

    let atoms = sdf::read_heavy_atoms(&sdf_path)?;
    tracing::info!(system = %system.name, "parsed {} heavy atoms from {}", atoms.len(), sdf_path.display());
    let map = parse_atomtype_inf(&std::fs::read_to_string(&inf)?);
    let (aligned, stats) = align_pdb(&std::fs::read_to_string(&newpdb)?, &atoms, &map);

    for name in &stats.unmapped {
        tracing::warn!(system = %system.name, "{name} not found in {}", paths::ATOMTYPE_INF);
    }
    for entry in &stats.out_of_range {
        tracing::error!(system = %system.name, "{entry} is out of range");
    }

    let out = system.ligprep(paths::LIG_PDB);
    io::atomic_write(&out, aligned.as_bytes())?;
    tracing::info!(system = %system.name, updated = stats.updated, "saved {}", out.display());
    Ok(AlignOutcome::Aligned(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INF: &str = "\
ATOM TYPE INFORMATION
[   1 ] (C1  )  c
[   2 ] (O1  )  o
[   3 ] (H1  )  hc
[   4 ] (O2  )  o
[   9 ] (N9  )  n
";

    const NEWPDB: &str = "\
REMARK generated
HETATM    1  C1  MOL     1       0.100   0.200   0.300  1.00  0.00           C
HETATM    2  O1  MOL     1       1.100   1.200   1.300  1.00  0.00           O
HETATM    3  H1  MOL     1       2.100   2.200   2.300  1.00  0.00           H
HETATM    4  O2  MOL     1       3.100   3.200   3.300  1.00  0.00           O
HETATM    5  N9  MOL     1       4.100   4.200   4.300  1.00  0.00           N
HETATM    6  S1  MOL     1       5.100   5.200   5.300  1.00  0.00           S
END
";

    #[test]
    fn inf_parsing_skips_hydrogens() {
        let map = parse_atomtype_inf(INF);
        assert_eq!(map.len(), 4);
        assert_eq!(map["C1"], 1);
        assert_eq!(map["O2"], 4);
        assert!(!map.contains_key("H1"));
    }

    #[test]
    fn align_replaces_mapped_coordinates() {
        let atoms = sdf::heavy_atoms(crate::sdf::tests::ACETATE, std::path::Path::new("a.sdf")).unwrap();
        let mut map = parse_atomtype_inf(INF);
        // acetate has three heavy atoms; O2 maps onto the third
        map.insert("O2".to_string(), 3);
        let (out, stats) = align_pdb(NEWPDB, &atoms, &map);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "REMARK generated");
        assert_eq!(&lines[1][30..54], "   1.000   2.000   3.000");
        assert_eq!(&lines[2][30..54], "   0.500  -1.250   0.000");
        assert_eq!(&lines[3][30..54], "  -2.123   0.000   1.500");
        assert!(lines[1].ends_with("1.00  0.00           C"));
        assert_eq!(stats.updated, 3);
        assert_eq!(stats.hydrogens_dropped, 1);
        assert!(!out.contains(" H1 "));
    }

    #[test]
    fn align_keeps_unmapped_and_out_of_range_lines() {
        let atoms = sdf::heavy_atoms(crate::sdf::tests::ACETATE, std::path::Path::new("a.sdf")).unwrap();
        let map = parse_atomtype_inf(INF);
        let (out, stats) = align_pdb(NEWPDB, &atoms, &map);
        assert!(out.contains("4.100   4.200   4.300"));
        assert!(out.contains("5.100   5.200   5.300"));
        assert_eq!(stats.unmapped, vec!["S1"]);
        assert_eq!(stats.out_of_range.len(), 2);
        assert!(out.ends_with("END\n"));
    }

    #[test]
    fn align_all_writes_lig_pdb_and_skips_incomplete() {
        let dir = TempDir::new().unwrap();
        let ready = dir.path().join("system1");
        std::fs::create_dir_all(ready.join("ligprep")).unwrap();
        std::fs::write(ready.join("system1.sdf"), crate::sdf::tests::ACETATE).unwrap();
        std::fs::write(ready.join("ligprep/NEWPDB.PDB"), NEWPDB).unwrap();
        std::fs::write(ready.join("ligprep/ATOMTYPE.INF"), INF).unwrap();

        let missing = dir.path().join("system2");
        std::fs::create_dir_all(missing.join("ligprep")).unwrap();
        std::fs::write(missing.join("system2.sdf"), crate::sdf::tests::ACETATE).unwrap();

        let reports = align_all(&[SystemDir::new(&ready), SystemDir::new(&missing)]);
        assert!(matches!(reports[0].outcome, AlignOutcome::Aligned(_)));
        assert!(matches!(reports[1].outcome, AlignOutcome::Skipped { .. }));
        assert!(ready.join("ligprep/LIG.PDB").exists());
        assert!(!missing.join("ligprep/LIG.PDB").exists());
    }

    #[test]
    fn malformed_sdf_skips_only_that_system() {
        let dir = TempDir::new().unwrap();
        let mut systems = Vec::new();
        for (name, sdf) in [("system1", "broken\n\n\n  7  0\n    1.0 2.0 3.0 C\n"), ("system2", crate::sdf::tests::ACETATE)] {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.join("ligprep")).unwrap();
            std::fs::write(path.join(format!("{name}.sdf")), sdf).unwrap();
            std::fs::write(path.join("ligprep/NEWPDB.PDB"), NEWPDB).unwrap();
            std::fs::write(path.join("ligprep/ATOMTYPE.INF"), INF).unwrap();
            systems.push(SystemDir::new(path));
        }

        let reports = align_all(&systems);
        assert_eq!(reports.len(), 2);
        match &reports[0].outcome {
            AlignOutcome::Skipped { reason } => assert!(reason.contains("atom block")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(matches!(reports[1].outcome, AlignOutcome::Aligned(_)));
        assert!(!systems[0].ligprep("LIG.PDB").exists());
        assert!(systems[1].ligprep("LIG.PDB").exists());
    }
}
