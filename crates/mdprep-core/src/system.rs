use crate::error::{PrepError, Result};
use crate::io;
use crate::paths;
use crate::types::SystemKind;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// SystemDir
// ---------------------------------------------------------------------------

/// One `system*` directory: a receptor and, optionally, a ligand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemDir {
    pub name: String,
    pub path: PathBuf,
}

impl SystemDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    /// First `.sdf` (lowercase extension only) in the system root, by name.
    pub fn ligand_sdf(&self) -> Option<PathBuf> {
        first_with_extension(&self.path, "sdf", false)
    }

    /// First `.pdb` (any case) in the system root, by name.
    pub fn receptor_pdb(&self) -> Option<PathBuf> {
        first_with_extension(&self.path, "pdb", true)
    }

    pub fn has_ligand(&self) -> bool {
        self.ligand_sdf().is_some()
    }

    /// Complex iff the ligand preparation produced every file tleap needs.
    pub fn kind(&self) -> SystemKind {
        let ready = [paths::LIG_FRCMOD, paths::LIG_PREP, paths::LIG_PDB]
            .iter()
            .all(|f| paths::ligprep_file(&self.path, f).is_file());
        if ready {
            SystemKind::Complex
        } else {
            SystemKind::Protein
        }
    }

    pub fn ligprep(&self, name: &str) -> PathBuf {
        paths::ligprep_file(&self.path, name)
    }

    pub fn parameters(&self, name: &str) -> PathBuf {
        paths::parameters_file(&self.path, name)
    }

    /// GROMACS inputs live in `parameters/`; older layouts kept them in the system root.
    pub fn gromacs_file(&self, name: &str) -> PathBuf {
        let preferred = self.parameters(name);
        if preferred.exists() {
            return preferred;
        }
        let legacy = self.path.join(name);
        if legacy.exists() {
            legacy
        } else {
            preferred
        }
    }
}

fn first_with_extension(dir: &Path, ext: &str, any_case: bool) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    if any_case {
                        e.eq_ignore_ascii_case(ext)
                    } else {
                        e == ext
                    }
                })
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// All `system*` directories directly under `root`, sorted by name.
pub fn discover_systems(root: &Path) -> Result<Vec<SystemDir>> {
    let mut systems: Vec<SystemDir> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter(|e| paths::is_system_dir_name(&e.file_name().to_string_lossy()))
        .map(|e| SystemDir::new(e.path()))
        .collect();
    if systems.is_empty() {
        return Err(PrepError::NoSystems(root.to_path_buf()));
    }
    systems.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(systems)
}

/// Create `ligprep/`, `parameters/` and `mdp/` in every system.
pub fn prepare_system_directories(systems: &[SystemDir]) -> Result<()> {
    for system in systems {
        for sub in paths::SYSTEM_SUBDIRS {
            let dir = system.path.join(sub);
            if io::ensure_dir(&dir)? {
                tracing::info!(system = %system.name, "created folder: {}", dir.display());
            } else {
                tracing::debug!(system = %system.name, "folder already exists: {}", dir.display());
            }
        }
    }
    Ok(())
}
