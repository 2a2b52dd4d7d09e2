//! GROMACS run-parameter templates and per-stage timestep rewriting.

use crate::error::Result;
use crate::io;
use crate::paths;
use crate::system::SystemDir;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const EM: &str = "em";
pub const NVT: &str = "nvt";
pub const NPT: &str = "npt";

pub const DEFAULT_EM: &str = "\
; Energy minimisation
define          = -DPOSRES
integrator      = steep
emtol           = 1000.0
emstep          = 0.01
nsteps          = 50000
dt              = 0.002

nstlist         = 10
cutoff-scheme   = Verlet
coulombtype     = PME
rcoulomb        = 1.0
rvdw            = 1.0
pbc             = xyz
";

pub const DEFAULT_NVT: &str = "\
; NVT equilibration with heavy-atom restraints
define                  = -DPOSRES
integrator              = md
nsteps                  = 50000
dt                      = 0.002

nstxout-compressed      = 5000
nstenergy               = 500
nstlog                  = 500

continuation            = no
constraint_algorithm    = lincs
constraints             = h-bonds
cutoff-scheme           = Verlet
nstlist                 = 10
rcoulomb                = 1.0
rvdw                    = 1.0
coulombtype             = PME
tcoupl                  = V-rescale
tc-grps                 = System
tau_t                   = 0.1
ref_t                   = 300
pcoupl                  = no
pbc                     = xyz
gen_vel                 = yes
gen_temp                = 300
gen_seed                = -1
";

pub const DEFAULT_NPT: &str = "\
; NPT equilibration with heavy-atom restraints
define                  = -DPOSRES
integrator              = md
nsteps                  = 50000
dt                      = 0.002

nstxout-compressed      = 5000
nstenergy               = 500
nstlog                  = 500

continuation            = yes
constraint_algorithm    = lincs
constraints             = h-bonds
cutoff-scheme           = Verlet
nstlist                 = 10
rcoulomb                = 1.0
rvdw                    = 1.0
coulombtype             = PME
tcoupl                  = V-rescale
tc-grps                 = System
tau_t                   = 0.1
ref_t                   = 300
pcoupl                  = C-rescale
pcoupltype              = isotropic
tau_p                   = 2.0
ref_p                   = 1.0
compressibility         = 4.5e-5
refcoord_scaling        = com
pbc                     = xyz
gen_vel                 = no
";

pub fn default_template(kind: &str) -> Option<&'static str> {
    match kind {
        EM => Some(DEFAULT_EM),
        NVT => Some(DEFAULT_NVT),
        NPT => Some(DEFAULT_NPT),
        _ => None,
    }
}

static DT_RE: OnceLock<Regex> = OnceLock::new();

/// Replace every `dt = <number>` assignment with `dt = <dt>`.
pub fn set_timestep(content: &str, dt: f64) -> String {
    let re = DT_RE.get_or_init(|| Regex::new(r"\bdt\s*=\s*\d+\.?\d*").expect("static regex"));
    re.replace_all(content, format!("dt = {dt}").as_str()).into_owned()
}

/// Copy `mdp/<kind>.mdp` to `dest` with the timestep rewritten.
pub fn write_stage_mdp(system: &Path, kind: &str, dt: f64, dest: &Path) -> Result<()> {
    let template = std::fs::read_to_string(paths::mdp_template(system, kind))?;
    io::atomic_write(dest, set_timestep(&template, dt).as_bytes())
}

/// Write the default templates into every system's `mdp/` where missing.
/// Returns the paths that were created.
pub fn install_defaults(systems: &[SystemDir]) -> Result<Vec<std::path::PathBuf>> {
    let mut written = Vec::new();
    for system in systems {
        io::ensure_dir(&paths::mdp_dir(&system.path))?;
        for kind in [EM, NVT, NPT] {
            let path = paths::mdp_template(&system.path, kind);
            let body = default_template(kind).unwrap_or_default();
            if io::write_if_missing(&path, body.as_bytes())? {
                tracing::info!(system = %system.name, "wrote default {}", path.display());
                written.push(path);
            }
        }
    }
    Ok(written)
}
