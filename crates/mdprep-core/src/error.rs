use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("no system directories found under {0}")]
    NoSystems(PathBuf),

    #[error("no ligand SDF files found in any system directory")]
    NoLigands,

    #[error("[{system}] missing input: {}", path.display())]
    MissingInput { system: String, path: PathBuf },

    #[error("failed to launch '{tool}': {reason}")]
    ToolSpawn { tool: String, reason: String },

    #[error("'{tool}' exited with code {code}: {detail}")]
    ToolFailed {
        tool: String,
        code: i32,
        detail: String,
    },

    #[error("'{tool}' timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("total charge not found in {}", .0.display())]
    ChargeNotFound(PathBuf),

    #[error("timed out waiting for quantum-chemistry jobs: {}", pending.join(", "))]
    WaitTimeout { pending: Vec<String> },

    #[error("invalid system kind '{0}': expected 'protein' or 'complex'")]
    InvalidSystemKind(String),

    #[error("stage '{stage}' failed for: {}", failures.join(", "))]
    StageFailed {
        stage: String,
        failures: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PrepError>;
