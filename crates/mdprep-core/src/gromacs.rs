//! AMBER → GROMACS conversion and position restraints.
//!
//! Conversion is delegated to ParmEd through the configured Python
//! interpreter. Restraints are two pieces of work on the converted topology:
//! `#ifdef POSRES` include blocks inside the receptor and ligand molecule
//! types, and the `posre*.itp` files those blocks include, produced by
//! `gmx genrestr`.

use crate::config::Config;
use crate::error::{PrepError, Result};
use crate::io;
use crate::leap;
use crate::paths;
use crate::system::SystemDir;
use crate::tool_runner::{self, ToolCommand};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Residue / molecule-type name given to the ligand throughout the pipeline.
pub const LIGAND_MOLECULE: &str = "MOL";

const NULL_DEVICE: &str = "/dev/null";

const PARMED_SCRIPT: &str = "\
import sys
import parmed as pmd
amber = pmd.load_file(sys.argv[1], sys.argv[2])
amber.save(sys.argv[3], format='gromacs', overwrite=True)
amber.save(sys.argv[4], format='gro', overwrite=True)
";

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

pub fn parmed_command(config: &Config, prmtop: &Path, inpcrd: &Path, top: &Path, gro: &Path) -> ToolCommand {
    ToolCommand::new(&config.tools.python)
        .args(["-c", PARMED_SCRIPT])
        .path_arg(prmtop)
        .path_arg(inpcrd)
        .path_arg(top)
        .path_arg(gro)
}

/// Resolve an AMBER input named on the command line against a system:
/// absolute paths as given, otherwise `parameters/` then the system root.
pub fn resolve_amber_input(system: &SystemDir, name: &str) -> PathBuf {
    let given = Path::new(name);
    if given.is_absolute() {
        return given.to_path_buf();
    }
    system.gromacs_file(name)
}

/// Convert `prmtop`/`inpcrd` into `parameters/gmx.top` and `parameters/gmx.gro`.
pub fn convert_system(config: &Config, system: &SystemDir, prmtop: &Path, inpcrd: &Path) -> Result<()> {
    for input in [prmtop, inpcrd] {
        if !input.is_file() {
            return Err(PrepError::MissingInput {
                system: system.name.clone(),
                path: input.to_path_buf(),
            });
        }
    }
    let dir = paths::parameters_dir(&system.path);
    io::ensure_dir(&dir)?;
    let top = dir.join(paths::GMX_TOP);
    let gro = dir.join(paths::GMX_GRO);
    tool_runner::run(&parmed_command(config, prmtop, inpcrd, &top, &gro), None)?;
    tracing::info!(system = %system.name, "converted: {}, {}", top.display(), gro.display());
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConvertOutcome {
    Converted,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub system: String,
    #[serde(flatten)]
    pub outcome: ConvertOutcome,
}

impl ConvertReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, ConvertOutcome::Failed { .. })
    }
}

/// Convert the named AMBER files in every system.
pub fn convert_all(config: &Config, systems: &[SystemDir], prmtop: &str, inpcrd: &str) -> Vec<ConvertReport> {
    systems
        .iter()
        .map(|system| {
            let result = convert_system(
                config,
                system,
                &resolve_amber_input(system, prmtop),
                &resolve_amber_input(system, inpcrd),
            );
            let outcome = match result {
                Ok(()) => ConvertOutcome::Converted,
                Err(e) => {
                    tracing::error!(system = %system.name, "AMBER to GROMACS conversion failed: {e}");
                    ConvertOutcome::Failed { error: e.to_string() }
                }
            };
            ConvertReport {
                system: system.name.clone(),
                outcome,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Include blocks
// ---------------------------------------------------------------------------

static SECTION_RE: OnceLock<Regex> = OnceLock::new();

fn section_re() -> &'static Regex {
    SECTION_RE.get_or_init(|| Regex::new(r"(?i)^\s*\[\s*(\w+)\s*\]").expect("static regex"))
}

pub fn posres_block(itp: &str) -> String {
    format!("; Include Position restraint file\n#ifdef  POSRES\n#include \"{itp}\"\n#endif\n\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MoleculeType {
    name: String,
    /// Index of the `[ moleculetype ]` header line.
    start: usize,
    /// Index of the first line after the section.
    end: usize,
}

fn section_name(line: &str) -> Option<String> {
    section_re()
        .captures(line)
        .map(|c| c[1].to_ascii_lowercase())
}

fn molecule_types(lines: &[String]) -> Vec<MoleculeType> {
    let mut types = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if section_name(&lines[i]).as_deref() != Some("moleculetype") {
            i += 1;
            continue;
        }
        let start = i;
        let name = lines[start + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with(';'))
            .and_then(|l| l.split_whitespace().next())
            .unwrap_or("")
            .to_string();
        let mut end = start + 1;
        while end < lines.len() {
            match section_name(&lines[end]).as_deref() {
                Some("moleculetype") | Some("system") | Some("molecules") => break,
                _ => end += 1,
            }
        }
        types.push(MoleculeType { name, start, end });
        i = end;
    }
    types
}

/// Add the receptor and ligand restraint includes to a GROMACS topology.
///
/// `posre1.itp` goes into the molecule type directly before `MOL` (the first
/// molecule type when there is no ligand); `posre2.itp` goes into `MOL`.
/// Sections that already include their file are left alone. Returns the new
/// text and the include files that were added.
pub fn insert_posres(top: &str) -> (String, Vec<&'static str>) {
    let mut lines: Vec<String> = top.split_inclusive('\n').map(str::to_string).collect();
    let types = molecule_types(&lines);
    let ligand = types.iter().position(|t| t.name == LIGAND_MOLECULE);

    let receptor = match ligand {
        Some(0) => None,
        Some(i) => Some(i - 1),
        None if types.is_empty() => None,
        None => Some(0),
    };

    let mut targets: Vec<(&MoleculeType, &'static str)> = Vec::new();
    if let Some(i) = receptor {
        targets.push((&types[i], paths::POSRE_RECEPTOR));
    }
    if let Some(i) = ligand {
        targets.push((&types[i], paths::POSRE_LIGAND));
    }

    let mut added = Vec::new();
    let mut inserts: Vec<(usize, &'static str)> = Vec::new();
    for (mt, itp) in targets {
        let include = format!("#include \"{itp}\"");
        let present = lines[mt.start..mt.end].iter().any(|l| l.trim() == include);
        if present {
            tracing::debug!("{itp} already included in {}", mt.name);
            continue;
        }
        inserts.push((mt.end, itp));
        added.push(itp);
    }

    // Back to front so earlier indices stay valid.
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    for (at, itp) in inserts {
        if at > 0 && !lines[at - 1].ends_with('\n') {
            lines[at - 1].push('\n');
        }
        lines.insert(at, posres_block(itp));
    }

    (lines.concat(), added)
}

// ---------------------------------------------------------------------------
// genrestr
// ---------------------------------------------------------------------------

static PROTEIN_GROUP_RE: OnceLock<Regex> = OnceLock::new();
static LIGAND_COUNT_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexGroups {
    pub protein_group: Option<u32>,
    pub ligand_atoms: Option<usize>,
}

/// Pull the Protein group index and MOL atom count from genrestr's group listing.
pub fn parse_index_groups(output: &str) -> IndexGroups {
    let protein = PROTEIN_GROUP_RE
        .get_or_init(|| Regex::new(r"Group\s+(\d+)\s+\(\s*Protein\s*\)").expect("static regex"));
    let ligand = LIGAND_COUNT_RE.get_or_init(|| {
        Regex::new(r"Group\s+\d+\s+\(\s*MOL\s*\)\s+has\s+(\d+)\s+elements").expect("static regex")
    });
    IndexGroups {
        protein_group: protein.captures(output).and_then(|c| c[1].parse().ok()),
        ligand_atoms: ligand.captures(output).and_then(|c| c[1].parse().ok()),
    }
}

/// First `atoms + 4` lines of the receptor restraint file: its header plus
/// the leading atoms, which belong to the ligand molecule type.
pub fn ligand_restraints(posre: &str, atoms: usize) -> String {
    posre.split_inclusive('\n').take(atoms + 4).collect()
}

fn genrestr_command(config: &Config, dir: &Path, output: &str) -> ToolCommand {
    ToolCommand::new(&config.tools.gmx)
        .args(["genrestr", "-f", paths::GMX_GRO, "-o", output])
        .cwd(dir)
}

/// Run genrestr twice: once to list groups, once to write `posre1.itp`.
/// Writes `posre2.itp` when the MOL group was found.
pub fn generate_restraints(config: &Config, system: &SystemDir, dir: &Path) -> Result<IndexGroups> {
    let listing = tool_runner::probe(&genrestr_command(config, dir, NULL_DEVICE).stdin("\n"), None)?;
    let groups = parse_index_groups(&listing.combined());

    let group = match groups.protein_group {
        Some(g) => {
            tracing::debug!(system = %system.name, "detected Protein group index: {g}");
            g
        }
        None => {
            tracing::warn!(system = %system.name, "Protein group not found, defaulting to 1");
            1
        }
    };

    tool_runner::run(
        &genrestr_command(config, dir, paths::POSRE_RECEPTOR).stdin(format!("{group}\n")),
        None,
    )?;
    tracing::info!(system = %system.name, "generated {}", paths::POSRE_RECEPTOR);

    match groups.ligand_atoms {
        Some(atoms) => {
            let posre = std::fs::read_to_string(dir.join(paths::POSRE_RECEPTOR))?;
            io::atomic_write(&dir.join(paths::POSRE_LIGAND), ligand_restraints(&posre, atoms).as_bytes())?;
            tracing::info!(system = %system.name, atoms, "generated {}", paths::POSRE_LIGAND);
        }
        None => tracing::warn!(system = %system.name, "MOL atom count not found; {} not generated", paths::POSRE_LIGAND),
    }

    Ok(IndexGroups {
        protein_group: Some(group),
        ..groups
    })
}

// ---------------------------------------------------------------------------
// Restrain stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestrainOutcome {
    Restrained {
        converted: bool,
        includes_added: Vec<String>,
        groups: IndexGroups,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RestrainReport {
    pub system: String,
    #[serde(flatten)]
    pub outcome: RestrainOutcome,
}

impl RestrainReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, RestrainOutcome::Failed { .. })
    }
}

pub fn restrain_all(config: &Config, systems: &[SystemDir]) -> Vec<RestrainReport> {
    systems
        .iter()
        .map(|system| {
            let outcome = match restrain_one(config, system) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(system = %system.name, "restraint setup failed: {e}");
                    RestrainOutcome::Failed { error: e.to_string() }
                }
            };
            RestrainReport {
                system: system.name.clone(),
                outcome,
            }
        })
        .collect()
}

fn restrain_one(config: &Config, system: &SystemDir) -> Result<RestrainOutcome> {
    let mut converted = false;
    if !system.gromacs_file(paths::GMX_TOP).exists() {
        let (stem, _) = leap::solvated_outputs(system.kind());
        let prmtop = system.parameters(&format!("{stem}.prmtop"));
        let inpcrd = system.parameters(&format!("{stem}.inpcrd"));
        if !prmtop.is_file() || !inpcrd.is_file() {
            tracing::error!(system = %system.name, "{} not found and no {stem} AMBER topology to convert", paths::GMX_TOP);
            return Ok(RestrainOutcome::Skipped {
                reason: format!("no {} and no {stem}.prmtop/{stem}.inpcrd", paths::GMX_TOP),
            });
        }
        tracing::info!(system = %system.name, "{} not found, converting {stem}.prmtop", paths::GMX_TOP);
        convert_system(config, system, &prmtop, &inpcrd)?;
        converted = true;
    }

    let top_path = system.gromacs_file(paths::GMX_TOP);
    let dir = top_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| paths::parameters_dir(&system.path));

    let (top, added) = insert_posres(&std::fs::read_to_string(&top_path)?);
    if added.is_empty() {
        tracing::info!(system = %system.name, "no restraint includes added");
    } else {
        io::atomic_write(&top_path, top.as_bytes())?;
        tracing::info!(system = %system.name, "added {} to {}", added.join(", "), top_path.display());
    }

    let groups = generate_restraints(config, system, &dir)?;
    Ok(RestrainOutcome::Restrained {
        converted,
        includes_added: added.into_iter().map(str::to_string).collect(),
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPLEX_TOP: &str = "\
[ defaults ]
; nbfunc        comb-rule       gen-pairs       fudgeLJ fudgeQQ
1               2               yes             0.5     0.8333

[ moleculetype ]
; molname\tnrexcl
MOL\t3

[ atoms ]
    1 c3   1 MOL C1 1 -0.1 12.01

[ moleculetype ]
; molname\tnrexcl
system1\t3

[ atoms ]
    1 N    1 MET N  1 0.15 14.01

[ moleculetype ]
; molname\tnrexcl
Na+\t3

[ atoms ]
    1 Na+  1 Na+ Na+ 1 1.0 22.99

[ system ]
; Name
Generic title

[ molecules ]
; Compound       #mols
MOL              1
system1          1
Na+              2
";

    #[test]
    fn block_format() {
        assert_eq!(
            posres_block("posre1.itp"),
            "; Include Position restraint file\n#ifdef  POSRES\n#include \"posre1.itp\"\n#endif\n\n"
        );
    }

    #[test]
    fn finds_molecule_types_and_bounds() {
        let lines: Vec<String> = COMPLEX_TOP.split_inclusive('\n').map(str::to_string).collect();
        let types = molecule_types(&lines);
        let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["MOL", "system1", "Na+"]);
        assert!(lines[types[2].end].starts_with("[ system ]"));
    }

    #[test]
    fn ligand_first_gets_only_ligand_block() {
        let (out, added) = insert_posres(COMPLEX_TOP);
        assert_eq!(added, [paths::POSRE_LIGAND]);
        let mol_end = out.find("[ moleculetype ]\n; molname\tnrexcl\nsystem1").unwrap();
        assert!(out[..mol_end].contains("#include \"posre2.itp\""));
    }

    #[test]
    fn receptor_before_ligand_gets_both_blocks() {
        let top = "\
[ moleculetype ]
system1 3
[ atoms ]
1 N
[ moleculetype ]
MOL 3
[ atoms ]
1 C
[ moleculetype ]
WAT 3
[ system ]
x
";
        let (out, added) = insert_posres(top);
        assert_eq!(added, [paths::POSRE_RECEPTOR, paths::POSRE_LIGAND]);
        let p1 = out.find("posre1.itp").unwrap();
        let p2 = out.find("posre2.itp").unwrap();
        let mol = out.find("MOL 3").unwrap();
        let wat = out.find("WAT 3").unwrap();
        assert!(p1 < mol && mol < p2 && p2 < wat);
    }

    #[test]
    fn protein_only_restrains_first_molecule_type() {
        let top = "[ moleculetype ]\nsystem1 3\n[ atoms ]\n1 N\n[ moleculetype ]\nWAT 3\n[ system ]\nx\n";
        let (out, added) = insert_posres(top);
        assert_eq!(added, [paths::POSRE_RECEPTOR]);
        assert!(out.find("posre1.itp").unwrap() < out.find("WAT 3").unwrap());
        assert!(!out.contains("posre2.itp"));
    }

    #[test]
    fn insertion_is_idempotent() {
        let (once, _) = insert_posres(COMPLEX_TOP);
        let (twice, added) = insert_posres(&once);
        assert!(added.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_genrestr_groups() {
        let listing = "\
Group     0 (         System) has 52000 elements
Group     1 (        Protein) has  4100 elements
Group    13 (            MOL) has    31 elements
Select a group: ";
        let groups = parse_index_groups(listing);
        assert_eq!(groups.protein_group, Some(1));
        assert_eq!(groups.ligand_atoms, Some(31));
        assert_eq!(parse_index_groups("nothing"), IndexGroups::default());
    }

    #[test]
    fn ligand_restraints_take_header_plus_atoms() {
        let posre = "; header\n\n[ position_restraints ]\n; i funct\n1 1\n2 1\n3 1\n";
        assert_eq!(
            ligand_restraints(posre, 2),
            "; header\n\n[ position_restraints ]\n; i funct\n1 1\n2 1\n"
        );
    }

    #[test]
    fn resolve_input_prefers_parameters() {
        let dir = TempDir::new().unwrap();
        let system = SystemDir::new(dir.path().join("system1"));
        std::fs::create_dir_all(system.path.join("parameters")).unwrap();
        std::fs::write(system.path.join("x.prmtop"), "").unwrap();
        assert_eq!(resolve_amber_input(&system, "x.prmtop"), system.path.join("x.prmtop"));
        std::fs::write(system.parameters("x.prmtop"), "").unwrap();
        assert_eq!(resolve_amber_input(&system, "x.prmtop"), system.parameters("x.prmtop"));
        assert_eq!(resolve_amber_input(&system, "/abs/x.prmtop"), PathBuf::from("/abs/x.prmtop"));
    }

    #[test]
    fn convert_missing_input_is_error() {
        let dir = TempDir::new().unwrap();
        let system = SystemDir::new(dir.path().join("system1"));
        let err = convert_system(
            &Config::default(),
            &system,
            &system.path.join("a.prmtop"),
            &system.path.join("a.inpcrd"),
        )
        .unwrap_err();
        assert!(matches!(err, PrepError::MissingInput { .. }));
    }

    #[test]
    fn restrain_without_inputs_is_skipped() {
        let dir = TempDir::new().unwrap();
        let system = SystemDir::new(dir.path().join("system1"));
        std::fs::create_dir_all(&system.path).unwrap();
        let reports = restrain_all(&Config::default(), &[system]);
        assert!(matches!(reports[0].outcome, RestrainOutcome::Skipped { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn restrain_converts_inserts_and_generates() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let exe = |name: &str, body: &str| {
            let p = dir.path().join(name);
            std::fs::write(&p, format!("#!/bin/sh\n{body}")).unwrap();
            std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
            p.to_string_lossy().into_owned()
        };
        let python = exe(
            "fake-python",
            &format!("cat > \"$5\" <<'EOF'\n{COMPLEX_TOP}EOF\necho gro > \"$6\"\n"),
        );
        let gmx = exe(
            "fake-gmx",
            "if [ \"$5\" = /dev/null ]; then\n\
             echo 'Group     1 (        Protein) has    20 elements'\n\
             echo 'Group    13 (            MOL) has     2 elements'\n\
             exit 1\nfi\n\
             read g\necho \"$g\" > group.txt\n\
             printf '; posre\\n\\n[ position_restraints ]\\n; i\\n1 1\\n2 1\\n3 1\\n' > \"$5\"\n",
        );

        let system = SystemDir::new(dir.path().join("system1"));
        std::fs::create_dir_all(system.path.join("parameters")).unwrap();
        std::fs::write(system.parameters("pro-sol.prmtop"), "").unwrap();
        std::fs::write(system.parameters("pro-sol.inpcrd"), "").unwrap();

        let mut cfg = Config::default();
        cfg.tools.python = python;
        cfg.tools.gmx = gmx;
        let reports = restrain_all(&cfg, std::slice::from_ref(&system));
        match &reports[0].outcome {
            RestrainOutcome::Restrained { converted, groups, .. } => {
                assert!(converted);
                assert_eq!(groups.protein_group, Some(1));
                assert_eq!(groups.ligand_atoms, Some(2));
            }
            other => panic!("unexpected: {other:?}"),
        }
        let top = std::fs::read_to_string(system.parameters("gmx.top")).unwrap();
        assert!(top.contains("#include \"posre2.itp\""));
        assert_eq!(std::fs::read_to_string(system.parameters("group.txt")).unwrap(), "1\n");
        let posre2 = std::fs::read_to_string(system.parameters("posre2.itp")).unwrap();
        assert_eq!(posre2.lines().count(), 6);
    }
}
