use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SystemKind
// ---------------------------------------------------------------------------

/// Topology branch for a system: receptor alone, or receptor plus ligand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Protein,
    Complex,
}

impl SystemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemKind::Protein => "protein",
            SystemKind::Complex => "complex",
        }
    }
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SystemKind {
    type Err = crate::error::PrepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "protein" | "0" => Ok(SystemKind::Protein),
            "complex" | "1" => Ok(SystemKind::Complex),
            _ => Err(crate::error::PrepError::InvalidSystemKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LigandQm,
    ChargeFit,
    AtomNames,
    Topology,
    Conversion,
    Equilibration,
    Done,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::LigandQm,
            Stage::ChargeFit,
            Stage::AtomNames,
            Stage::Topology,
            Stage::Conversion,
            Stage::Equilibration,
            Stage::Done,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::LigandQm => "ligand_qm",
            Stage::ChargeFit => "charge_fit",
            Stage::AtomNames => "atom_names",
            Stage::Topology => "topology",
            Stage::Conversion => "conversion",
            Stage::Equilibration => "equilibration",
            Stage::Done => "done",
        }
    }

    /// The CLI invocation that advances a system out of this stage.
    pub fn command(self) -> &'static str {
        match self {
            Stage::LigandQm => "mdprep ligand submit",
            Stage::ChargeFit => "mdprep resp",
            Stage::AtomNames => "mdprep atoms",
            Stage::Topology => "mdprep topology",
            Stage::Conversion => "mdprep convert restrain",
            Stage::Equilibration => "mdprep equilibrate",
            Stage::Done => "",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Completion state of a quantum-chemistry output log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
    Running,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Running => "running",
        }
    }

    pub fn is_finished(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
