//! Request orchestration: normalize, score, rank, dose, de-escalate.

use crate::clinical::{self, ClinicalOutcome, NO_CHANGE_FIT};
use crate::coverage;
use crate::deescalation;
use crate::dosing;
use crate::glucose::{band_targets, goal_band};
use crate::normalizer::build_profile;
use crate::ranker;
use crate::request::PatientRequest;
use crate::result::{
    ConfigVersions, DoseOutcome, Exclusion, Pick, PickRole, RecommendationResult, ScoredDrug,
};
use glycora_common::{GlycoraError, PatientProfile, Result};
use glycora_config::{ConfigStore, RuleContext};
use std::sync::Arc;
use tracing::{info, warn};

/// Synthetic candidate id for continuing the current regimen.
pub const NO_CHANGE_ID: &str = "no_change";

/// The deterministic recommendation core. Holds only the shared read-only
/// store; every evaluation allocates its own profile and pool, so one engine
/// serves concurrent requests without locking.
#[derive(Clone)]
pub struct Engine {
    store: Arc<ConfigStore>,
}

impl Engine {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Engine { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Evaluate one request. Identical input always yields an identical
    /// result: no randomness, no clock reads.
    pub fn evaluate(&self, req: &PatientRequest) -> Result<RecommendationResult> {
        let store = self.store.as_ref();
        let profile = build_profile(req, store)?;

        let band = goal_band(store, &profile).ok_or_else(|| {
            GlycoraError::ConfigValidation(format!(
                "goal band {} missing",
                profile.goal_tier.as_str()
            ))
        })?;
        let (fasting_target, post_prandial_target) = band_targets(band);
        let ctx = RuleContext::from_profile(&profile, fasting_target, post_prandial_target);

        let mut warnings = Vec::new();
        let (mut pool, excluded) = self.score_pool(&profile, &ctx);

        // Synthetic "No Change": continuation of the current regimen at its
        // current doses, eligible only when the regimen passes its own deny
        // rules.
        match clinical::no_change_objection(store, &profile, &ctx) {
            None => pool.push(self.no_change_entry()),
            Some(objection) => {
                if !profile.medications.is_empty() {
                    warnings.push(format!("continuing current regimen not advised: {objection}"));
                }
            }
        }

        info!(
            pool = pool.len(),
            excluded = excluded.len(),
            "candidates scored"
        );

        let ranked = ranker::rank(pool);
        let selection = ranker::select(&ranked, store)?;

        let mut picks = Vec::new();
        picks.push(self.make_pick(PickRole::Primary, selection.primary.clone(), &profile, &mut warnings));
        if let Some(alternate) = selection.alternate.clone() {
            picks.push(self.make_pick(PickRole::Alternate, alternate, &profile, &mut warnings));
        }
        if let Some(lowest_cost) = selection.lowest_cost.clone() {
            picks.push(self.make_pick(PickRole::LowestCost, lowest_cost, &profile, &mut warnings));
        }

        // Companion de-escalation applies when the primary pick introduces a
        // high-potency class the patient is not already on.
        let initiated_class = picks
            .first()
            .filter(|p| !p.drug.no_change)
            .map(|p| p.drug.class.as_str())
            .filter(|class| deescalation::is_high_potency_class(class) && !profile.on_class(class));

        let deescalation = deescalation::advise(&profile, store, initiated_class);

        self.renal_therapy_warnings(&profile, &ctx, &mut warnings);

        info!(
            primary = %picks[0].drug.drug_id,
            picks = picks.len(),
            deescalation = deescalation.len(),
            "recommendation assembled"
        );

        Ok(RecommendationResult {
            ranked,
            excluded,
            picks,
            deescalation,
            warnings,
            config_versions: ConfigVersions {
                formulary: store.formulary.version.clone(),
                dosing: store.dosing.version.clone(),
                glucose: store.glucose.version.clone(),
            },
        })
    }

    /// Score every candidate drug. Exclusions (deny rules, allergies,
    /// current-drug-at-max, affordability gate) apply before either score so
    /// an excluded drug can never win on coverage.
    fn score_pool(
        &self,
        profile: &PatientProfile,
        ctx: &RuleContext<'_>,
    ) -> (Vec<ScoredDrug>, Vec<Exclusion>) {
        let store = self.store.as_ref();
        let mut pool = Vec::new();
        let mut excluded = Vec::new();

        let gate_to_affordable = profile.insurance == glycora_common::Insurance::Uninsured
            && profile.cannot_afford_copay;

        for (drug_id, drug) in &store.formulary.drugs {
            let Some(class_def) = store.class(&drug.class) else {
                continue; // unreachable after validation
            };

            if gate_to_affordable && !class_def.affordable {
                excluded.push(Exclusion {
                    drug_id: drug_id.clone(),
                    reason: "outside affordable set for uninsured patient".to_string(),
                });
                continue;
            }

            match clinical::score_drug(drug_id, store, profile, ctx) {
                ClinicalOutcome::Excluded { reason } => {
                    excluded.push(Exclusion { drug_id: drug_id.clone(), reason });
                }
                ClinicalOutcome::Scored(breakdown) => {
                    let coverage_detail = coverage::score_class(class_def, profile);
                    pool.push(ScoredDrug {
                        drug_id: drug_id.clone(),
                        display_name: drug.display_name.clone(),
                        class: drug.class.clone(),
                        class_display: class_def.display_name.clone(),
                        clinical_fit: breakdown.total,
                        coverage: coverage_detail.total,
                        clinical_detail: breakdown,
                        coverage_detail: Some(coverage_detail),
                        no_change: false,
                    });
                }
            }
        }
        (pool, excluded)
    }

    fn no_change_entry(&self) -> ScoredDrug {
        ScoredDrug {
            drug_id: NO_CHANGE_ID.to_string(),
            display_name: "No Change".to_string(),
            class: "No Change".to_string(),
            class_display: "No Change".to_string(),
            clinical_fit: NO_CHANGE_FIT,
            coverage: 1.0,
            clinical_detail: crate::clinical::ClinicalBreakdown {
                base: NO_CHANGE_FIT,
                boosts: vec![],
                cautions: vec![],
                therapy_boost: 0.0,
                class_bonus: 0.0,
                goal_bonus: 0.0,
                potency_boost: 0.0,
                hypoglycemia_penalty: 0.0,
                total: NO_CHANGE_FIT,
            },
            coverage_detail: None,
            no_change: true,
        }
    }

    /// Attach a dose instruction to a pick. `NoDoseRuleForBand` is reported
    /// on the pick and as a warning; it never aborts the recommendation.
    fn make_pick(
        &self,
        role: PickRole,
        drug: ScoredDrug,
        profile: &PatientProfile,
        warnings: &mut Vec<String>,
    ) -> Pick {
        let dose = if drug.no_change {
            DoseOutcome::Continue
        } else {
            match dosing::resolve(&drug.drug_id, self.store.as_ref(), profile) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(drug = %drug.drug_id, %err, "dose unresolved");
                    warnings.push(format!("dose for {} unresolved: {err}", drug.drug_id));
                    DoseOutcome::Unresolved { reason: err.to_string() }
                }
            }
        };
        Pick { role, drug, dose }
    }

    /// Advisory notice when a deny/caution rule that reads eGFR matches for
    /// a drug the patient is currently taking.
    fn renal_therapy_warnings(
        &self,
        profile: &PatientProfile,
        ctx: &RuleContext<'_>,
        warnings: &mut Vec<String>,
    ) {
        use glycora_config::RuleOutcome;
        for med in &profile.medications {
            let Some(drug_id) = med.drug_id.as_deref() else { continue };
            let Some(drug) = self.store.drug(drug_id) else { continue };
            let renal_hit = drug
                .deny_if
                .iter()
                .map(|r| &r.when)
                .chain(drug.caution_if.iter().map(|r| &r.when))
                .any(|cond| cond.mentions_egfr() && cond.evaluate(ctx) == RuleOutcome::Matched);
            if renal_hit {
                warnings.push(format!(
                    "current therapy {drug_id} has kidney-function concerns at eGFR {}",
                    profile.egfr
                ));
            }
        }
    }
}
