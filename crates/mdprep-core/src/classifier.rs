use crate::config::Config;
use crate::gaussian;
use crate::paths;
use crate::rules::default_rules;
use crate::system::SystemDir;
use crate::types::{JobStatus, Stage, SystemKind};
use serde::Serialize;

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

pub struct EvalContext<'a> {
    pub system: &'a SystemDir,
    pub config: &'a Config,
    pub kind: SystemKind,
    pub has_ligand: bool,
    /// Status of `ligprep/lig.log`; `None` when absent or unreadable.
    pub ligand_log: Option<JobStatus>,
}

impl<'a> EvalContext<'a> {
    pub fn new(system: &'a SystemDir, config: &'a Config) -> Self {
        let ligand_log = gaussian::read_log_status(&system.ligprep(paths::LIG_LOG)).ok();
        Self {
            system,
            config,
            kind: system.kind(),
            has_ligand: system.has_ligand(),
            ligand_log,
        }
    }
}

// ---------------------------------------------------------------------------
// StageStatus (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub system: String,
    pub kind: SystemKind,
    pub stage: Stage,
    pub message: String,
    pub next_command: String,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule; the first whose condition holds names the pending stage.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&EvalContext) -> bool,
    pub stage: Stage,
    pub message: fn(&EvalContext) -> String,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, ctx: &EvalContext) -> StageStatus {
        for rule in &self.rules {
            if (rule.condition)(ctx) {
                tracing::debug!(system = %ctx.system.name, rule = rule.id, "matched");
                return StageStatus {
                    system: ctx.system.name.clone(),
                    kind: ctx.kind,
                    stage: rule.stage,
                    message: (rule.message)(ctx),
                    next_command: rule.stage.command().to_string(),
                };
            }
        }

        // Fallback: done
        StageStatus {
            system: ctx.system.name.clone(),
            kind: ctx.kind,
            stage: Stage::Done,
            message: format!("{} is equilibrated", ctx.system.name),
            next_command: String::new(),
        }
    }
}

/// Pending stage of every system, in discovery order.
pub fn classify_all(systems: &[SystemDir], config: &Config) -> Vec<StageStatus> {
    let classifier = Classifier::new(default_rules());
    systems
        .iter()
        .map(|system| classifier.classify(&EvalContext::new(system, config)))
        .collect()
}
