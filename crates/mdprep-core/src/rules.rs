use crate::classifier::{EvalContext, Rule};
use crate::equilibrate;
use crate::leap;
use crate::mdp;
use crate::paths;
use crate::types::{JobStatus, Stage};

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn ligprep_missing(ctx: &EvalContext, name: &str) -> bool {
    !ctx.system.ligprep(name).is_file()
}

fn parameters_missing(ctx: &EvalContext, name: &str) -> bool {
    !ctx.system.gromacs_file(name).is_file()
}

fn solvated_prmtop(ctx: &EvalContext) -> String {
    let (stem, _) = leap::solvated_outputs(ctx.kind);
    format!("{stem}.prmtop")
}

fn em_template_missing(ctx: &EvalContext) -> bool {
    !paths::mdp_template(&ctx.system.path, mdp::EM).is_file()
}

// ---------------------------------------------------------------------------
// Default rules
// ---------------------------------------------------------------------------

/// Ordered stage rules. Ligand rules only fire for systems with an SDF.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "ligand_qm",
            condition: |ctx| ctx.has_ligand && ctx.ligand_log != Some(JobStatus::Completed),
            stage: Stage::LigandQm,
            message: |ctx| match ctx.ligand_log {
                None => "Gaussian job not submitted".to_string(),
                Some(JobStatus::Failed) => {
                    "Gaussian job failed; resubmit with `mdprep ligand submit --resubmit-failed`".to_string()
                }
                Some(_) => "Gaussian job running".to_string(),
            },
        },
        Rule {
            id: "charge_fit",
            condition: |ctx| {
                ctx.has_ligand
                    && (ligprep_missing(ctx, paths::LIG_PREP) || ligprep_missing(ctx, paths::LIG_FRCMOD))
            },
            stage: Stage::ChargeFit,
            message: |_| format!("{} or {} missing", paths::LIG_PREP, paths::LIG_FRCMOD),
        },
        Rule {
            id: "atom_names",
            condition: |ctx| ctx.has_ligand && ligprep_missing(ctx, paths::LIG_PDB),
            stage: Stage::AtomNames,
            message: |_| format!("{} missing", paths::LIG_PDB),
        },
        Rule {
            id: "topology",
            condition: |ctx| !ctx.system.parameters(&solvated_prmtop(ctx)).is_file(),
            stage: Stage::Topology,
            message: |ctx| format!("{} topology not built ({} missing)", ctx.kind, solvated_prmtop(ctx)),
        },
        Rule {
            id: "conversion",
            condition: |ctx| {
                parameters_missing(ctx, paths::GMX_TOP)
                    || parameters_missing(ctx, paths::GMX_GRO)
                    || parameters_missing(ctx, paths::POSRE_RECEPTOR)
            },
            stage: Stage::Conversion,
            message: |ctx| {
                if parameters_missing(ctx, paths::GMX_TOP) || parameters_missing(ctx, paths::GMX_GRO) {
                    format!("{} / {} not converted", paths::GMX_TOP, paths::GMX_GRO)
                } else {
                    format!("{} not generated", paths::POSRE_RECEPTOR)
                }
            },
        },
        Rule {
            id: "equilibration",
            condition: |ctx| {
                em_template_missing(ctx)
                    || !equilibrate::final_output(&ctx.system.path, ctx.config.equilibration.cycles()).is_file()
            },
            stage: Stage::Equilibration,
            message: |ctx| {
                if em_template_missing(ctx) {
                    format!("{}/{}.mdp missing; `mdprep init` writes defaults", paths::MDP_DIR, mdp::EM)
                } else {
                    "equilibration incomplete".to_string()
                }
            },
        },
    ]
}
