//! Diff engine - cross-tree matching and plan synthesis

mod engine;
mod matcher;
mod plan;

pub use engine::{Plan, PlanStats};
pub use matcher::{classify, Classification, ClassificationSummary, Verdict};
pub use plan::{plan_mirror, plan_move, validate_plan, STAGING_PREFIX};
