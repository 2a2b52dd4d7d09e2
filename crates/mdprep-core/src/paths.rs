use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Project-level names
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "mdprep.yaml";
pub const MASTER_LOG: &str = "master.log";
pub const SYSTEM_PREFIX: &str = "system";

// ---------------------------------------------------------------------------
// Per-system subdirectories
// ---------------------------------------------------------------------------

pub const LIGPREP_DIR: &str = "ligprep";
pub const PARAMETERS_DIR: &str = "parameters";
pub const MDP_DIR: &str = "mdp";

/// Subdirectories created in every system directory before any stage runs.
pub const SYSTEM_SUBDIRS: [&str; 3] = [LIGPREP_DIR, PARAMETERS_DIR, MDP_DIR];

pub const SIMULATION_LOG: &str = "simulation.log";

// ---------------------------------------------------------------------------
// Ligand files (inside ligprep/)
// ---------------------------------------------------------------------------

pub const LIG_STEM: &str = "lig";
pub const LIG_GJF: &str = "lig.gjf";
pub const LIG_LOG: &str = "lig.log";
pub const LIG_PREP: &str = "lig.prep";
pub const LIG_FRCMOD: &str = "lig.frcmod";
pub const LIG_PDB: &str = "LIG.PDB";
pub const NEWPDB: &str = "NEWPDB.PDB";
pub const ATOMTYPE_INF: &str = "ATOMTYPE.INF";

// ---------------------------------------------------------------------------
// Topology files (inside parameters/)
// ---------------------------------------------------------------------------

pub const LEAP_LOG: &str = "leap.log";
pub const GMX_TOP: &str = "gmx.top";
pub const GMX_GRO: &str = "gmx.gro";
pub const POSRE_RECEPTOR: &str = "posre1.itp";
pub const POSRE_LIGAND: &str = "posre2.itp";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn master_log_path(root: &Path) -> PathBuf {
    root.join(MASTER_LOG)
}

pub fn ligprep_dir(system: &Path) -> PathBuf {
    system.join(LIGPREP_DIR)
}

pub fn ligprep_file(system: &Path, name: &str) -> PathBuf {
    ligprep_dir(system).join(name)
}

pub fn parameters_dir(system: &Path) -> PathBuf {
    system.join(PARAMETERS_DIR)
}

pub fn parameters_file(system: &Path, name: &str) -> PathBuf {
    parameters_dir(system).join(name)
}

pub fn mdp_dir(system: &Path) -> PathBuf {
    system.join(MDP_DIR)
}

pub fn mdp_template(system: &Path, kind: &str) -> PathBuf {
    mdp_dir(system).join(format!("{kind}.mdp"))
}

pub fn simulation_log(system: &Path) -> PathBuf {
    system.join(SIMULATION_LOG)
}

/// `<system>/<stage>/<stage>.<ext>`, the layout of every equilibration stage.
pub fn stage_file(system: &Path, stage: &str, ext: &str) -> PathBuf {
    system.join(stage).join(format!("{stage}.{ext}"))
}

/// True if `name` follows the `system*` directory naming convention.
pub fn is_system_dir_name(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}
