//! Reconciliation of stage flags into a [`RunPlan`].

use clap::Args;
use prasc_core::{RunPlan, StageMode};
use std::fmt;

/// Stage selection flags shared by `prasc` and `prasc run`.
#[derive(Args, Debug, Clone, Default)]
pub struct StageFlags {
    /// Replace existing result files
    #[arg(short, long)]
    pub overwrite: bool,

    /// Keep per-stage result files after combining
    #[arg(short, long)]
    pub keepall: bool,

    /// Re-align recordings that already have a corrected version
    #[arg(long)]
    pub refix: bool,

    /// Skip alignment correction and use the recordings as they are
    #[arg(long)]
    pub nofix: bool,

    /// Recalculate reading measures for every recording
    #[arg(long)]
    pub resentences: bool,

    /// Skip reading measure extraction
    #[arg(long)]
    pub nosentences: bool,

    /// Rescore comprehension questions for every recording
    #[arg(long)]
    pub requestions: bool,

    /// Skip comprehension question scoring
    #[arg(long)]
    pub noquestions: bool,

    /// Do not combine result files (implies --keepall)
    #[arg(long)]
    pub nocombine: bool,

    /// Shorthand for --refix --resentences --requestions
    #[arg(long)]
    pub reeverything: bool,
}

/// Adjustment made to contradictory or risky flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanWarning {
    /// A re-X flag was dropped because the matching no-X flag was set.
    Conflicting { stage: &'static str },
    /// Combining recordings that were not aligned in this run.
    CombineWithoutFix,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::Conflicting { stage } => write!(
                f,
                "--re{stage} and --no{stage} cannot both be set; --no{stage} is respected"
            ),
            PlanWarning::CombineWithoutFix => f.write_str(
                "combining results without alignment correction; recordings that were never \
                 corrected can lead to missing data",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Run {
        plan: RunPlan,
        warnings: Vec<PlanWarning>,
    },
    /// Every stage was switched off.
    NothingToDo,
}

fn stage(force: bool, skip: bool, name: &'static str, warnings: &mut Vec<PlanWarning>) -> StageMode {
    if skip {
        if force {
            warnings.push(PlanWarning::Conflicting { stage: name });
        }
        StageMode::Skip
    } else if force {
        StageMode::Force
    } else {
        StageMode::Incremental
    }
}

impl StageFlags {
    pub fn reconcile(&self) -> Reconciled {
        if self.nofix && self.nosentences && self.noquestions && self.nocombine {
            return Reconciled::NothingToDo;
        }

        let mut warnings = Vec::new();
        let fix = stage(self.refix || self.reeverything, self.nofix, "fix", &mut warnings);
        let measures = stage(
            self.resentences || self.reeverything,
            self.nosentences,
            "sentences",
            &mut warnings,
        );
        let questions = stage(
            self.requestions || self.reeverything,
            self.noquestions,
            "questions",
            &mut warnings,
        );
        let combine = !self.nocombine;
        if combine && fix == StageMode::Skip {
            warnings.push(PlanWarning::CombineWithoutFix);
        }

        Reconciled::Run {
            plan: RunPlan {
                fix,
                measures,
                questions,
                combine,
                keep_all: self.keepall || !combine,
                overwrite: self.overwrite,
            },
            warnings,
        }
    }
}
