//! Tagged condition-rule evaluator.
//!
//! Rules are a closed set of predicate shapes over the patient profile, never
//! free-form expressions. A numeric rule over a glucose-derived field that the
//! profile cannot supply evaluates to `NotApplicable` rather than false, so a
//! missing signal never silently flips a clinical decision.

use glycora_common::PatientProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Fields and operators ─────────────────────────────────────────────────────

/// The closed set of numeric fields a rule may compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    Egfr,
    A1c,
    Age,
    Goal,
    FastingAvg,
    PostPrandialAvg,
    /// Fasting average minus the goal band's fasting target.
    FastingAboveGoal,
    /// Post-prandial average minus the goal band's post-prandial target.
    PostPrandialAboveGoal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    /// Inclusive range check; requires `upper`.
    Between,
}

// ── Conditions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    All { rules: Vec<Condition> },
    Any { rules: Vec<Condition> },
    Numeric {
        field: NumericField,
        op: CmpOp,
        value: f64,
        #[serde(default)]
        upper: Option<f64>,
    },
    Comorbidity { any_of: Vec<String> },
    Allergy { any_of: Vec<String> },
    /// Matches when any hypoglycemic episode is documented.
    LowsDocumented,
}

/// Three-valued rule result. `NotApplicable` means the profile lacks the
/// signal the rule needs and the rule must be skipped, not treated as false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Matched,
    NotMatched,
    NotApplicable,
}

/// Profile fields plus goal-band targets, flattened for rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub egfr: f64,
    pub a1c: Option<f64>,
    pub age: Option<f64>,
    pub goal: f64,
    pub fasting_avg: Option<f64>,
    pub post_prandial_avg: Option<f64>,
    pub fasting_target: f64,
    pub post_prandial_target: f64,
    pub lows_documented: bool,
    pub comorbidities: &'a BTreeSet<String>,
    pub allergy_labels: &'a BTreeSet<String>,
}

impl<'a> RuleContext<'a> {
    pub fn from_profile(
        profile: &'a PatientProfile,
        fasting_target: f64,
        post_prandial_target: f64,
    ) -> Self {
        RuleContext {
            egfr: profile.egfr,
            a1c: profile.a1c,
            age: profile.age,
            goal: profile.goal,
            fasting_avg: profile.glucose.fasting_avg,
            post_prandial_avg: profile.glucose.post_prandial_avg,
            fasting_target,
            post_prandial_target,
            lows_documented: profile.glucose.lows_documented(),
            comorbidities: &profile.comorbidities,
            allergy_labels: &profile.allergy_labels,
        }
    }

    fn numeric_value(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::Egfr => Some(self.egfr),
            NumericField::A1c => self.a1c,
            NumericField::Age => self.age,
            NumericField::Goal => Some(self.goal),
            NumericField::FastingAvg => self.fasting_avg,
            NumericField::PostPrandialAvg => self.post_prandial_avg,
            NumericField::FastingAboveGoal => self.fasting_avg.map(|v| v - self.fasting_target),
            NumericField::PostPrandialAboveGoal => {
                self.post_prandial_avg.map(|v| v - self.post_prandial_target)
            }
        }
    }
}

impl Condition {
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        match self {
            Condition::All { rules } => {
                let mut saw_gap = false;
                for rule in rules {
                    match rule.evaluate(ctx) {
                        RuleOutcome::NotMatched => return RuleOutcome::NotMatched,
                        RuleOutcome::NotApplicable => saw_gap = true,
                        RuleOutcome::Matched => {}
                    }
                }
                if saw_gap {
                    RuleOutcome::NotApplicable
                } else {
                    RuleOutcome::Matched
                }
            }
            Condition::Any { rules } => {
                let mut all_gaps = !rules.is_empty();
                for rule in rules {
                    match rule.evaluate(ctx) {
                        RuleOutcome::Matched => return RuleOutcome::Matched,
                        RuleOutcome::NotMatched => all_gaps = false,
                        RuleOutcome::NotApplicable => {}
                    }
                }
                if all_gaps {
                    RuleOutcome::NotApplicable
                } else {
                    RuleOutcome::NotMatched
                }
            }
            Condition::Numeric { field, op, value, upper } => {
                let Some(actual) = ctx.numeric_value(*field) else {
                    return RuleOutcome::NotApplicable;
                };
                let hit = match op {
                    CmpOp::Lt => actual < *value,
                    CmpOp::Lte => actual <= *value,
                    CmpOp::Gt => actual > *value,
                    CmpOp::Gte => actual >= *value,
                    CmpOp::Eq => (actual - *value).abs() < f64::EPSILON,
                    CmpOp::Between => {
                        let hi = upper.unwrap_or(*value);
                        actual >= *value && actual <= hi
                    }
                };
                if hit {
                    RuleOutcome::Matched
                } else {
                    RuleOutcome::NotMatched
                }
            }
            Condition::Comorbidity { any_of } => {
                let hit = any_of
                    .iter()
                    .any(|c| ctx.comorbidities.contains(&c.to_uppercase()));
                if hit {
                    RuleOutcome::Matched
                } else {
                    RuleOutcome::NotMatched
                }
            }
            Condition::Allergy { any_of } => {
                let hit = any_of
                    .iter()
                    .any(|a| ctx.allergy_labels.contains(&a.to_lowercase()));
                if hit {
                    RuleOutcome::Matched
                } else {
                    RuleOutcome::NotMatched
                }
            }
            Condition::LowsDocumented => {
                if ctx.lows_documented {
                    RuleOutcome::Matched
                } else {
                    RuleOutcome::NotMatched
                }
            }
        }
    }

    /// The eGFR value below which this condition (or any subcondition)
    /// matches, if the condition encodes an eGFR floor. Used by startup
    /// validation to cross-check dosing-band floors against deny rules.
    pub fn egfr_floor(&self) -> Option<f64> {
        match self {
            Condition::Numeric { field: NumericField::Egfr, op, value, .. } => match op {
                CmpOp::Lt | CmpOp::Lte => Some(*value),
                _ => None,
            },
            Condition::All { rules } | Condition::Any { rules } => {
                rules.iter().filter_map(|r| r.egfr_floor()).fold(None, |acc, v| {
                    Some(match acc {
                        Some(a) if a >= v => a,
                        _ => v,
                    })
                })
            }
            _ => None,
        }
    }

    /// Whether the condition reads eGFR anywhere. Drives the current-therapy
    /// renal warning.
    pub fn mentions_egfr(&self) -> bool {
        match self {
            Condition::Numeric { field, .. } => *field == NumericField::Egfr,
            Condition::All { rules } | Condition::Any { rules } => {
                rules.iter().any(|r| r.mentions_egfr())
            }
            _ => false,
        }
    }
}

// ── Rule wrappers ────────────────────────────────────────────────────────────

/// Exclusion rule: a matching condition removes the drug from the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyRule {
    pub when: Condition,
    pub reason: String,
}

/// Additive rule: a matching condition adds (boost) or subtracts (caution)
/// its delta. All matching rules apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRule {
    pub when: Condition,
    pub delta: f64,
    #[serde(default)]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(comorbidities: &BTreeSet<String>, allergies: &BTreeSet<String>) -> RuleContext<'static> {
        // Leak is fine in tests; keeps the helper signature simple.
        let c = Box::leak(Box::new(comorbidities.clone()));
        let a = Box::leak(Box::new(allergies.clone()));
        RuleContext {
            egfr: 55.0,
            a1c: Some(8.2),
            age: Some(61.0),
            goal: 7.0,
            fasting_avg: Some(160.0),
            post_prandial_avg: None,
            fasting_target: 130.0,
            post_prandial_target: 180.0,
            lows_documented: false,
            comorbidities: c,
            allergy_labels: a,
        }
    }

    #[test]
    fn test_numeric_ops() {
        let empty = BTreeSet::new();
        let c = ctx(&empty, &empty);
        let lt = Condition::Numeric {
            field: NumericField::Egfr,
            op: CmpOp::Lt,
            value: 60.0,
            upper: None,
        };
        assert_eq!(lt.evaluate(&c), RuleOutcome::Matched);

        let between = Condition::Numeric {
            field: NumericField::Egfr,
            op: CmpOp::Between,
            value: 30.0,
            upper: Some(45.0),
        };
        assert_eq!(between.evaluate(&c), RuleOutcome::NotMatched);
    }

    #[test]
    fn test_missing_glucose_is_not_applicable() {
        let empty = BTreeSet::new();
        let c = ctx(&empty, &empty);
        let rule = Condition::Numeric {
            field: NumericField::PostPrandialAvg,
            op: CmpOp::Gt,
            value: 200.0,
            upper: None,
        };
        assert_eq!(rule.evaluate(&c), RuleOutcome::NotApplicable);

        // An All combinator containing the gap must not match.
        let all = Condition::All {
            rules: vec![
                Condition::Numeric {
                    field: NumericField::Egfr,
                    op: CmpOp::Gt,
                    value: 30.0,
                    upper: None,
                },
                rule,
            ],
        };
        assert_eq!(all.evaluate(&c), RuleOutcome::NotApplicable);
    }

    #[test]
    fn test_comorbidity_case_insensitive() {
        let comorbidities: BTreeSet<String> = ["ASCVD".to_string()].into_iter().collect();
        let empty = BTreeSet::new();
        let c = ctx(&comorbidities, &empty);
        let rule = Condition::Comorbidity {
            any_of: vec!["ascvd".to_string(), "chf".to_string()],
        };
        assert_eq!(rule.evaluate(&c), RuleOutcome::Matched);
    }

    #[test]
    fn test_fasting_above_goal_derivation() {
        let empty = BTreeSet::new();
        let c = ctx(&empty, &empty);
        // 160 avg − 130 target = 30 above goal
        let rule = Condition::Numeric {
            field: NumericField::FastingAboveGoal,
            op: CmpOp::Gte,
            value: 30.0,
            upper: None,
        };
        assert_eq!(rule.evaluate(&c), RuleOutcome::Matched);
    }

    #[test]
    fn test_egfr_floor_extraction() {
        let nested = Condition::Any {
            rules: vec![
                Condition::Numeric {
                    field: NumericField::Egfr,
                    op: CmpOp::Lt,
                    value: 30.0,
                    upper: None,
                },
                Condition::Comorbidity { any_of: vec!["dialysis".to_string()] },
            ],
        };
        assert_eq!(nested.egfr_floor(), Some(30.0));
        assert!(nested.mentions_egfr());
    }

    #[test]
    fn test_rule_json_shape() {
        let json = r#"{
            "when": {"kind": "numeric", "field": "egfr", "op": "lt", "value": 30.0},
            "reason": "contraindicated below eGFR 30"
        }"#;
        let rule: DenyRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.when.egfr_floor(), Some(30.0));
    }
}
