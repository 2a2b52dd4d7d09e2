//! The two facts the pipeline needs from a ligand SDF (V2000 molfile):
//! its net formal charge and its heavy-atom coordinates in file order.

use crate::error::{PrepError, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct SdfAtom {
    pub element: String,
    pub position: [f64; 3],
}

/// Net formal charge from the `M  CHG` property lines. No such line means neutral.
pub fn formal_charge(content: &str) -> i32 {
    content
        .lines()
        .filter(|l| l.starts_with("M  CHG"))
        .map(|line| {
            // M  CHG  n  atom1 charge1  atom2 charge2 ...
            line.split_whitespace()
                .skip(3)
                .skip(1)
                .step_by(2)
                .filter_map(|v| v.parse::<i32>().ok())
                .sum::<i32>()
        })
        .sum()
}

pub fn read_formal_charge(path: &Path) -> Result<i32> {
    Ok(formal_charge(&std::fs::read_to_string(path)?))
}

/// Heavy atoms (element not starting with `H`) from the atom block, in order.
pub fn heavy_atoms(content: &str, source: &Path) -> Result<Vec<SdfAtom>> {
    let malformed = |what: &str| {
        PrepError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {what}", source.display()),
        ))
    };

    let lines: Vec<&str> = content.lines().collect();
    let counts = lines.get(3).ok_or_else(|| malformed("missing counts line"))?;
    let atom_count: usize = counts
        .get(..3.min(counts.len()))
        .unwrap_or("")
        .trim()
        .parse()
        .map_err(|_| malformed("unreadable atom count"))?;

    let block = lines
        .get(4..4 + atom_count)
        .ok_or_else(|| malformed("atom block shorter than atom count"))?;

    let mut atoms = Vec::new();
    for line in block {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(malformed("short atom line"));
        }
        let element = parts[3].trim().to_ascii_uppercase();
        if element.starts_with('H') {
            continue;
        }
        let mut position = [0.0; 3];
        for (slot, raw) in position.iter_mut().zip(&parts[0..3]) {
            *slot = raw.parse().map_err(|_| malformed("unreadable coordinate"))?;
        }
        atoms.push(SdfAtom { element, position });
    }
    Ok(atoms)
}

pub fn read_heavy_atoms(path: &Path) -> Result<Vec<SdfAtom>> {
    heavy_atoms(&std::fs::read_to_string(path)?, path)
}
