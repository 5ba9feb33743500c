//! glycora-config — Versioned rule tables and the immutable `ConfigStore`.

pub mod rules;
pub mod store;
pub mod tables;

pub use rules::{CmpOp, Condition, DeltaRule, DenyRule, NumericField, RuleContext, RuleOutcome};
pub use store::ConfigStore;
pub use tables::{
    formulary_tier_delta, CostTier, CurvePoint, DoseLadder, DosingTable, DrugClassDef, DrugDef,
    EgfrBand, FormularyTable, GlucoseTable, GoalBand, Potency, TargetRange,
};
