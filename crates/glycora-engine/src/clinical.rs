//! Clinical-fit scoring.
//!
//! Per candidate drug: start from the configured base, exclude on any deny
//! match (or a class already at maximum dose), then apply boosts, cautions, the
//! current-therapy boost, the tight-goal bonus, the potency boost, and the
//! hypoglycemia penalty. Ordinary drugs cap at 0.90; only the synthetic
//! "No Change" option scores 1.0.

use crate::glucose::potency_boost;
use glycora_common::PatientProfile;
use glycora_config::{ConfigStore, RuleContext, RuleOutcome};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ceiling for any real drug's clinical fit.
pub const DRUG_FIT_CAP: f64 = 0.90;

/// Fit reserved for continuing the current regimen unchanged.
pub const NO_CHANGE_FIT: f64 = 1.0;

/// One boost or caution that actually fired, kept for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRule {
    pub label: String,
    pub delta: f64,
}

/// Full additive decomposition of a clinical-fit score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalBreakdown {
    pub base: f64,
    pub boosts: Vec<AppliedRule>,
    pub cautions: Vec<AppliedRule>,
    pub therapy_boost: f64,
    pub class_bonus: f64,
    pub goal_bonus: f64,
    pub potency_boost: f64,
    pub hypoglycemia_penalty: f64,
    /// Capped, clamped final fit.
    pub total: f64,
}

#[derive(Debug, Clone)]
pub enum ClinicalOutcome {
    Scored(ClinicalBreakdown),
    Excluded { reason: String },
}

/// Score one candidate drug, or exclude it.
///
/// Exclusion is evaluated here once and shared with coverage: a drug excluded
/// clinically never reappears on cost grounds.
pub fn score_drug(
    drug_id: &str,
    store: &ConfigStore,
    profile: &PatientProfile,
    ctx: &RuleContext<'_>,
) -> ClinicalOutcome {
    let Some(drug) = store.drug(drug_id) else {
        return ClinicalOutcome::Excluded { reason: format!("unknown drug {drug_id}") };
    };
    let Some((class_name, class_def)) = store.class_of(drug_id) else {
        return ClinicalOutcome::Excluded { reason: format!("unknown class for {drug_id}") };
    };

    if profile.allergy_drugs.contains(drug_id) {
        return ClinicalOutcome::Excluded { reason: "documented allergy to this drug".to_string() };
    }
    if class_def
        .allergy_labels
        .iter()
        .any(|l| profile.allergy_labels.contains(&l.to_lowercase()))
    {
        return ClinicalOutcome::Excluded { reason: "documented allergy to this class".to_string() };
    }

    for rule in &drug.deny_if {
        if rule.when.evaluate(ctx) == RuleOutcome::Matched {
            return ClinicalOutcome::Excluded { reason: rule.reason.clone() };
        }
    }

    if class_at_max(class_name, store, profile) {
        let reason = if profile.on_drug(drug_id) {
            "already at maximum dose for current kidney function".to_string()
        } else {
            format!("{} therapy already at maximum dose", class_def.display_name)
        };
        return ClinicalOutcome::Excluded { reason };
    }

    let on_drug = profile.on_drug(drug_id);
    let on_class = profile.on_class(class_name);

    let boosts: Vec<AppliedRule> = drug
        .clinical_boost
        .iter()
        .filter(|r| r.when.evaluate(ctx) == RuleOutcome::Matched)
        .map(|r| AppliedRule { label: r.label.clone(), delta: r.delta })
        .collect();
    let cautions: Vec<AppliedRule> = drug
        .caution_if
        .iter()
        .filter(|r| r.when.evaluate(ctx) == RuleOutcome::Matched)
        .map(|r| AppliedRule { label: r.label.clone(), delta: r.delta })
        .collect();

    let therapy_boost = if on_drug { store.formulary.current_therapy_boost } else { 0.0 };
    let class_bonus = if on_class && !on_drug { drug.drug_in_class_bonus } else { 0.0 };

    let goal_bonus = if drug.goal_band_bonus {
        if profile.goal <= 7.0 {
            store.glucose.goal_bonus_tight
        } else if profile.goal <= 7.5 {
            store.glucose.goal_bonus_moderate
        } else {
            0.0
        }
    } else {
        0.0
    };

    let potency = potency_boost(store, profile, class_name, on_drug);
    let penalty = hypoglycemia_penalty(class_def, profile);

    let mut total = drug.clinical_base;
    total += boosts.iter().map(|r| r.delta).sum::<f64>();
    total -= cautions.iter().map(|r| r.delta).sum::<f64>();
    total += therapy_boost + class_bonus + goal_bonus + potency;
    total -= penalty;
    let total = total.clamp(0.0, DRUG_FIT_CAP);

    debug!(drug = drug_id, fit = total, boosts = boosts.len(), cautions = cautions.len(),
           "clinical fit computed");

    ClinicalOutcome::Scored(ClinicalBreakdown {
        base: drug.clinical_base,
        boosts,
        cautions,
        therapy_boost,
        class_bonus,
        goal_bonus,
        potency_boost: potency,
        hypoglycemia_penalty: penalty,
        total,
    })
}

/// Penalty for insulin/secretagogue classes when hypoglycemia is documented.
/// Overnight lows weigh heaviest; rapid-acting agents take an extra hit for
/// post-meal lows.
fn hypoglycemia_penalty(
    class_def: &glycora_config::DrugClassDef,
    profile: &PatientProfile,
) -> f64 {
    let glucose = &profile.glucose;
    let mut penalty = 0.0;
    if class_def.hypoglycemia_risk {
        if glucose.overnight_lows {
            penalty += 0.20;
        } else if glucose.lows_documented() {
            penalty += 0.15;
        }
    }
    if class_def.postprandial_hypo_risk && glucose.post_prandial_lows {
        penalty += 0.10;
    }
    penalty
}

/// True when any current medication of this class sits at (or above) the top
/// of its eGFR-appropriate titration ladder. The whole class is excluded from
/// recommendation: the drug itself has no room to titrate, and adding a
/// second agent of the same class is never an option.
pub fn class_at_max(class_name: &str, store: &ConfigStore, profile: &PatientProfile) -> bool {
    profile
        .medications
        .iter()
        .filter(|m| m.class.as_deref() == Some(class_name))
        .any(|med| {
            let (Some(drug_id), Some(dose)) = (med.drug_id.as_deref(), med.dose) else {
                return false;
            };
            let Some(ladder) = store.ladder_for(drug_id, class_name) else {
                return false;
            };
            let Some(band) = ladder.band_for(profile.egfr) else {
                return false;
            };
            match band.max_step() {
                Some(max) => dose.ladder_amount(ladder.weekly) >= max - 1e-9,
                None => false,
            }
        })
}

/// Reason "No Change" is not clinically appropriate, if any. The current
/// regimen is held to the same deny rules as a fresh recommendation.
pub fn no_change_objection(
    store: &ConfigStore,
    profile: &PatientProfile,
    ctx: &RuleContext<'_>,
) -> Option<String> {
    let resolved: Vec<&str> = profile
        .medications
        .iter()
        .filter_map(|m| m.drug_id.as_deref())
        .collect();
    if resolved.is_empty() {
        return Some("no current regimen to continue".to_string());
    }
    for drug_id in resolved {
        if let Some(drug) = store.drug(drug_id) {
            for rule in &drug.deny_if {
                if rule.when.evaluate(ctx) == RuleOutcome::Matched {
                    return Some(format!(
                        "current regimen includes {drug_id}: {}",
                        rule.reason
                    ));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::build_profile;
    use crate::request::PatientRequest;
    use glycora_test_utils::demo_store;

    fn profile_for(json: &str) -> (glycora_config::ConfigStore, PatientProfile) {
        let store = demo_store();
        let req: PatientRequest = serde_json::from_str(json).unwrap();
        let profile = build_profile(&req, &store).unwrap();
        (store, profile)
    }

    fn ctx<'a>(
        store: &glycora_config::ConfigStore,
        profile: &'a PatientProfile,
    ) -> RuleContext<'a> {
        let band = crate::glucose::goal_band(store, profile).unwrap();
        let (f, p) = crate::glucose::band_targets(band);
        RuleContext::from_profile(profile, f, p)
    }

    #[test]
    fn test_fit_capped_at_090() {
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 9.0, "comorbidities": ["ASCVD", "CKD", "CHF"]}"#,
        );
        let c = ctx(&store, &profile);
        for drug_id in store.formulary.drugs.keys() {
            if let ClinicalOutcome::Scored(b) = score_drug(drug_id, &store, &profile, &c) {
                assert!(b.total <= DRUG_FIT_CAP + 1e-12, "{drug_id} fit {} above cap", b.total);
                assert!(b.total >= 0.0);
            }
        }
    }

    #[test]
    fn test_deny_rule_excludes() {
        // Metformin is denied below eGFR 30.
        let (store, profile) = profile_for(r#"{"egfr": 25.0, "a1c": 8.0}"#);
        let c = ctx(&store, &profile);
        match score_drug("metformin", &store, &profile, &c) {
            ClinicalOutcome::Excluded { reason } => assert!(reason.contains("eGFR")),
            ClinicalOutcome::Scored(_) => panic!("metformin should be denied at eGFR 25"),
        }
    }

    #[test]
    fn test_comorbidity_boost_applies() {
        let plain = profile_for(r#"{"egfr": 90.0, "a1c": 8.0}"#);
        let ascvd = profile_for(r#"{"egfr": 90.0, "a1c": 8.0, "comorbidities": ["ASCVD"]}"#);
        let fit = |pair: &(glycora_config::ConfigStore, PatientProfile)| {
            let c = ctx(&pair.0, &pair.1);
            match score_drug("empagliflozin", &pair.0, &pair.1, &c) {
                ClinicalOutcome::Scored(b) => b.total,
                ClinicalOutcome::Excluded { reason } => panic!("excluded: {reason}"),
            }
        };
        assert!(fit(&ascvd) > fit(&plain));
    }

    #[test]
    fn test_hypoglycemia_penalty_on_secretagogues() {
        let calm = profile_for(r#"{"egfr": 90.0, "a1c": 8.0}"#);
        let lows = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0, "glucose": {"fastingLows": true, "overnightLows": true}}"#,
        );
        let fit = |pair: &(glycora_config::ConfigStore, PatientProfile)| {
            let c = ctx(&pair.0, &pair.1);
            match score_drug("glipizide", &pair.0, &pair.1, &c) {
                ClinicalOutcome::Scored(b) => (b.total, b.hypoglycemia_penalty),
                ClinicalOutcome::Excluded { reason } => panic!("excluded: {reason}"),
            }
        };
        let (calm_fit, calm_pen) = fit(&calm);
        let (lows_fit, lows_pen) = fit(&lows);
        assert_eq!(calm_pen, 0.0);
        assert_eq!(lows_pen, 0.20);
        assert!(lows_fit < calm_fit);
    }

    #[test]
    fn test_current_therapy_boost() {
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0,
                "medications": [{"name": "sitagliptin", "dose": "50 mg daily"}]}"#,
        );
        let c = ctx(&store, &profile);
        match score_drug("sitagliptin", &store, &profile, &c) {
            ClinicalOutcome::Scored(b) => {
                assert_eq!(b.therapy_boost, store.formulary.current_therapy_boost);
            }
            ClinicalOutcome::Excluded { reason } => panic!("excluded: {reason}"),
        }
    }

    #[test]
    fn test_current_drug_at_max_excluded() {
        // eGFR 35 caps metformin at 1000 mg/day; 500 mg BID is that maximum.
        let (store, profile) = profile_for(
            r#"{"egfr": 35.0, "a1c": 8.0,
                "medications": [{"name": "metformin", "dose": "500 mg BID"}]}"#,
        );
        let c = ctx(&store, &profile);
        match score_drug("metformin", &store, &profile, &c) {
            ClinicalOutcome::Excluded { reason } => assert!(reason.contains("maximum dose")),
            ClinicalOutcome::Scored(_) => panic!("at-max metformin should be excluded"),
        }
    }

    #[test]
    fn test_classmate_at_max_excludes_whole_class() {
        // Glipizide at its ladder top blocks every sulfonylurea, not just
        // glipizide itself.
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0,
                "medications": [{"name": "glipizide", "dose": "20 mg daily"}]}"#,
        );
        let c = ctx(&store, &profile);
        for drug_id in ["glipizide", "glimepiride", "glyburide"] {
            match score_drug(drug_id, &store, &profile, &c) {
                ClinicalOutcome::Excluded { reason } => {
                    assert!(reason.contains("maximum dose"), "{drug_id}: {reason}");
                }
                ClinicalOutcome::Scored(_) => panic!("{drug_id} should be excluded"),
            }
        }
    }

    #[test]
    fn test_hypoglycemia_history_penalized_without_timed_lows() {
        // A hypoglycemia-history comorbidity counts as documented lows even
        // with no timed low flags on the request.
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0, "comorbidities": ["FREQUENT HYPOGLYCEMIA"],
                "medications": [{"name": "glipizide", "dose": "10 mg daily"}]}"#,
        );
        let c = ctx(&store, &profile);
        match score_drug("glipizide", &store, &profile, &c) {
            ClinicalOutcome::Scored(b) => assert_eq!(b.hypoglycemia_penalty, 0.15),
            ClinicalOutcome::Excluded { reason } => panic!("excluded: {reason}"),
        }
    }

    #[test]
    fn test_allergy_excludes_class() {
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0, "allergies": [{"allergen": "sulfonylurea"}]}"#,
        );
        let c = ctx(&store, &profile);
        assert!(matches!(
            score_drug("glipizide", &store, &profile, &c),
            ClinicalOutcome::Excluded { .. }
        ));
    }

    #[test]
    fn test_no_change_objection() {
        // On metformin with adequate kidney function: no objection.
        let (store, profile) = profile_for(
            r#"{"egfr": 90.0, "a1c": 8.0,
                "medications": [{"name": "metformin", "dose": "1000 mg daily"}]}"#,
        );
        let c = ctx(&store, &profile);
        assert!(no_change_objection(&store, &profile, &c).is_none());

        // Same regimen but eGFR dropped below the metformin floor.
        let (store, profile) = profile_for(
            r#"{"egfr": 25.0, "a1c": 8.0,
                "medications": [{"name": "metformin", "dose": "1000 mg daily"}]}"#,
        );
        let c = ctx(&store, &profile);
        let objection = no_change_objection(&store, &profile, &c).unwrap();
        assert!(objection.contains("metformin"));

        // No medications at all: nothing to continue.
        let (store, profile) = profile_for(r#"{"egfr": 90.0, "a1c": 8.0}"#);
        let c = ctx(&store, &profile);
        assert!(no_change_objection(&store, &profile, &c).is_some());
    }
}
