use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// Executable names (or absolute paths) of the external programs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub antechamber: String,
    pub parmchk2: String,
    pub tleap: String,
    pub gaussian: String,
    pub gmx: String,
    pub python: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            antechamber: "antechamber".to_string(),
            parmchk2: "parmchk2".to_string(),
            tleap: "tleap".to_string(),
            gaussian: "g16".to_string(),
            gmx: "gmx_mpi".to_string(),
            python: "python3".to_string(),
        }
    }
}

impl ToolsConfig {
    /// `(role, executable)` pairs, in pipeline order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("antechamber", self.antechamber.as_str()),
            ("parmchk2", self.parmchk2.as_str()),
            ("gaussian", self.gaussian.as_str()),
            ("tleap", self.tleap.as_str()),
            ("python", self.python.as_str()),
            ("gmx", self.gmx.as_str()),
        ]
    }
}

// ---------------------------------------------------------------------------
// GaussianConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianConfig {
    pub nproc: u32,
    pub memory: String,
    pub route: String,
    pub atom_type: String,
    pub residue_name: String,
}

impl Default for GaussianConfig {
    fn default() -> Self {
        Self {
            nproc: 4,
            memory: "4GB".to_string(),
            route: "#B3LYP/6-31G* em=gd3bj pop=MK iop(6/33=2,6/42=6) opt".to_string(),
            atom_type: "gaff2".to_string(),
            residue_name: "MOL".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LigandConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LigandConfig {
    pub poll_interval_secs: u64,
    /// `0` waits indefinitely.
    pub max_wait_secs: u64,
}

impl Default for LigandConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            max_wait_secs: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// LeapConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeapConfig {
    pub protein_ff: String,
    pub ligand_ff: String,
    pub water_ff: String,
    pub water_box: String,
    pub buffer: f64,
}

impl Default for LeapConfig {
    fn default() -> Self {
        Self {
            protein_ff: "leaprc.protein.ff19SB".to_string(),
            ligand_ff: "leaprc.gaff2".to_string(),
            water_ff: "leaprc.water.opc".to_string(),
            water_box: "OPCBOX".to_string(),
            buffer: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EquilibrationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibrationConfig {
    pub gpus: Vec<u32>,
    /// Total attempts per stage, not additional retries.
    pub max_retries: u32,
    /// Timestep (ps) per NVT/NPT cycle; the cycle count is its length.
    pub time_steps: Vec<f64>,
    /// Upper bound on any single grompp/mdrun invocation. `0` disables it.
    pub task_timeout_secs: u64,
}

impl Default for EquilibrationConfig {
    fn default() -> Self {
        Self {
            gpus: vec![0, 1, 2, 3],
            max_retries: 3,
            time_steps: vec![0.0005, 0.001, 0.002],
            task_timeout_secs: 3600,
        }
    }
}

impl EquilibrationConfig {
    pub fn cycles(&self) -> usize {
        self.time_steps.len()
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub gaussian: GaussianConfig,
    #[serde(default)]
    pub ligand: LigandConfig,
    #[serde(default)]
    pub leap: LeapConfig,
    #[serde(default)]
    pub equilibration: EquilibrationConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tools: ToolsConfig::default(),
            gaussian: GaussianConfig::default(),
            ligand: LigandConfig::default(),
            leap: LeapConfig::default(),
            equilibration: EquilibrationConfig::default(),
        }
    }
}

impl Config {
    /// Load `mdprep.yaml` from the project root, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (role, exe) in self.tools.entries() {
            if exe.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("tools.{role} is empty"),
                });
            }
        }

        if self.gaussian.nproc == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "gaussian.nproc must be at least 1".to_string(),
            });
        }

        if self.ligand.poll_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "ligand.poll_interval_secs is 0: wait will poll continuously"
                    .to_string(),
            });
        }

        if self.leap.buffer <= 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("leap.buffer must be positive, got {}", self.leap.buffer),
            });
        }

        let eq = &self.equilibration;
        if eq.gpus.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "equilibration.gpus is empty: no worker can run".to_string(),
            });
        }
        if eq.max_retries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "equilibration.max_retries is 0: no stage would ever run".to_string(),
            });
        }
        if eq.time_steps.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "equilibration.time_steps is empty: em takes its timestep from the first entry"
                    .to_string(),
            });
        }
        for dt in &eq.time_steps {
            if *dt <= 0.0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("equilibration.time_steps contains non-positive value {dt}"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
