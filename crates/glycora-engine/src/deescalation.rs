//! Therapy de-escalation chains.
//!
//! Independent chains, each an ordered (predicate, action) list over the
//! active-medication set, evaluated top to bottom, first match wins:
//! fasting/overnight lows, post-prandial/daytime lows, untimed lows when no
//! timed flag is set, and companion adjustments when a high-potency agent is
//! being initiated. When chains disagree about the same drug the more
//! conservative action is kept.

use crate::result::{DeescalationAction, DeescalationTrigger, DoseAction};
use glycora_common::profile::{CurrentMedication, DoseUnit};
use glycora_common::PatientProfile;
use glycora_config::ConfigStore;
use tracing::debug;

const FASTING_PRIORITY: &[&str] = &["Sulfonylurea", "Basal Insulin"];
const FASTING_FALLBACK: &[&str] =
    &["TZD", "Metformin", "GLP1", "DPP4", "Bolus Insulin", "SGLT2"];

const POSTPRANDIAL_PRIORITY: &[&str] =
    &["Bolus Insulin", "TZD", "Sulfonylurea", "GLP1", "Basal Insulin"];
const POSTPRANDIAL_FALLBACK: &[&str] = &["DPP4", "Metformin", "SGLT2"];

// Lows with no timing: secretagogues and both insulins lead.
const UNTIMED_PRIORITY: &[&str] = &["Sulfonylurea", "Basal Insulin", "Bolus Insulin"];
const UNTIMED_FALLBACK: &[&str] = &["TZD", "Metformin", "GLP1", "DPP4", "SGLT2"];

/// Classes whose initiation triggers companion adjustments.
pub fn is_high_potency_class(class: &str) -> bool {
    matches!(class, "GLP1" | "Basal Insulin" | "Bolus Insulin")
}

/// Run every applicable chain and reconcile overlapping actions.
/// `initiated_class` is the class of a newly recommended agent, if the
/// primary pick introduces one the patient is not already on.
pub fn advise(
    profile: &PatientProfile,
    store: &ConfigStore,
    initiated_class: Option<&str>,
) -> Vec<DeescalationAction> {
    let mut actions: Vec<DeescalationAction> = Vec::new();

    if profile.glucose.fasting_lows || profile.glucose.overnight_lows {
        if let Some(action) = first_match(
            profile,
            store,
            FASTING_PRIORITY,
            FASTING_FALLBACK,
            DeescalationTrigger::FastingLows,
        ) {
            actions.push(action);
        }
    }

    if profile.glucose.post_prandial_lows {
        if let Some(action) = first_match(
            profile,
            store,
            POSTPRANDIAL_PRIORITY,
            POSTPRANDIAL_FALLBACK,
            DeescalationTrigger::PostPrandialLows,
        ) {
            actions.push(action);
        }
    }

    // Untimed lows only drive their own chain when no timed flag already has.
    let timed = profile.glucose.fasting_lows
        || profile.glucose.overnight_lows
        || profile.glucose.post_prandial_lows;
    if profile.glucose.untimed_lows && !timed {
        if let Some(action) = first_match(
            profile,
            store,
            UNTIMED_PRIORITY,
            UNTIMED_FALLBACK,
            DeescalationTrigger::UntimedLows,
        ) {
            actions.push(action);
        }
    }

    if let Some(class) = initiated_class {
        for action in companion_adjustments(profile, store, class) {
            actions.push(action);
        }
    }

    reconcile(actions)
}

/// Walk a priority list then its fallback list; the first active class that
/// yields a computable action wins. An active drug whose dose cannot be
/// parsed yields nothing and the chain moves on.
fn first_match(
    profile: &PatientProfile,
    store: &ConfigStore,
    priority: &[&str],
    fallback: &[&str],
    trigger: DeescalationTrigger,
) -> Option<DeescalationAction> {
    for class in priority.iter().chain(fallback.iter()) {
        if let Some(med) = profile.med_for_class(class) {
            if let Some(action) = class_suggestion(class, med, profile, store) {
                debug!(class, ?trigger, "de-escalation chain matched");
                return Some(build(med, store, action, trigger));
            }
        }
    }
    None
}

/// Fixed companion set applied on top of everything when a high-potency
/// agent is introduced. All matching adjustments are emitted, not just the
/// first: the point is to offset the new agent across the whole regimen.
fn companion_adjustments(
    profile: &PatientProfile,
    store: &ConfigStore,
    initiated_class: &str,
) -> Vec<DeescalationAction> {
    let companions: &[&str] = match initiated_class {
        "GLP1" => &["DPP4", "Sulfonylurea", "TZD", "Basal Insulin", "Bolus Insulin"],
        "Basal Insulin" => &["Sulfonylurea", "TZD"],
        "Bolus Insulin" => &["Sulfonylurea", "TZD", "Basal Insulin"],
        _ => &[],
    };

    let mut actions = Vec::new();
    for class in companions {
        if let Some(med) = profile.med_for_class(class) {
            if let Some(action) = class_suggestion(class, med, profile, store) {
                actions.push(build(med, store, action, DeescalationTrigger::HighPotencyInitiation));
            }
        }
    }
    actions
}

/// Per-class reduce/stop rule for an active medication.
fn class_suggestion(
    class: &str,
    med: &CurrentMedication,
    profile: &PatientProfile,
    store: &ConfigStore,
) -> Option<DoseAction> {
    match class {
        "Sulfonylurea" => {
            let daily = med.dose?.per_day();
            // Glimepiride runs on a lower dose scale than glipizide/glyburide.
            let halve_at = if med.drug_id.as_deref() == Some("glimepiride") { 4.0 } else { 10.0 };
            Some(if daily >= halve_at {
                DoseAction::Reduce { new_amount: daily / 2.0, unit: DoseUnit::Mg }
            } else {
                DoseAction::Stop
            })
        }
        "Basal Insulin" => {
            let daily = med.dose?.per_day();
            Some(if daily >= 21.0 {
                DoseAction::Reduce { new_amount: daily * 0.8, unit: DoseUnit::Units }
            } else if daily >= 10.0 {
                DoseAction::Reduce { new_amount: daily / 2.0, unit: DoseUnit::Units }
            } else {
                DoseAction::Stop
            })
        }
        "Bolus Insulin" => {
            let daily = med.dose?.per_day();
            Some(if daily >= 15.0 {
                DoseAction::Reduce { new_amount: daily * 0.8, unit: DoseUnit::Units }
            } else if daily >= 6.0 {
                DoseAction::Reduce { new_amount: daily / 2.0, unit: DoseUnit::Units }
            } else {
                DoseAction::Stop
            })
        }
        "TZD" => {
            let daily = med.dose?.per_day();
            Some(if daily > 15.0 {
                DoseAction::Reduce { new_amount: daily - 15.0, unit: DoseUnit::Mg }
            } else {
                DoseAction::Stop
            })
        }
        "Metformin" => {
            let daily = med.dose?.per_day();
            Some(if daily > 500.0 {
                DoseAction::Reduce { new_amount: daily / 2.0, unit: DoseUnit::Mg }
            } else {
                DoseAction::Stop
            })
        }
        "GLP1" => glp1_step_down(med, profile, store),
        "DPP4" => Some(DoseAction::Stop),
        "SGLT2" => {
            // Kept at reduced dose for its cardiorenal benefit.
            if profile.has_comorbidity("CHF") || profile.has_comorbidity("CKD") {
                let daily = med.dose?.per_day();
                Some(DoseAction::Reduce { new_amount: daily / 2.0, unit: DoseUnit::Mg })
            } else {
                Some(DoseAction::Stop)
            }
        }
        _ => None,
    }
}

/// Step a GLP-1 down its own titration ladder; stop at the lowest step.
fn glp1_step_down(
    med: &CurrentMedication,
    profile: &PatientProfile,
    store: &ConfigStore,
) -> Option<DoseAction> {
    let dose = med.dose?;
    let drug_id = med.drug_id.as_deref()?;
    let ladder = store.ladder_for(drug_id, "GLP1")?;
    let band = ladder.band_for(profile.egfr)?;
    let amount = dose.ladder_amount(ladder.weekly);
    let lower = band
        .steps
        .iter()
        .rev()
        .find(|step| **step < amount - 1e-9);
    Some(match lower {
        Some(step) => DoseAction::Reduce { new_amount: *step, unit: ladder.unit },
        None => DoseAction::Stop,
    })
}

fn build(
    med: &CurrentMedication,
    store: &ConfigStore,
    action: DoseAction,
    trigger: DeescalationTrigger,
) -> DeescalationAction {
    let drug = med.drug_id.clone().unwrap_or_else(|| med.raw_name.clone());
    let display_name = med
        .drug_id
        .as_deref()
        .and_then(|id| store.drug(id))
        .map(|d| d.display_name.clone())
        .unwrap_or_else(|| med.raw_name.clone());
    DeescalationAction { drug, display_name, action, trigger }
}

/// Collapse actions targeting the same drug, keeping the more conservative
/// one. Order of the surviving actions follows first appearance.
fn reconcile(actions: Vec<DeescalationAction>) -> Vec<DeescalationAction> {
    let mut merged: Vec<DeescalationAction> = Vec::new();
    for action in actions {
        match merged.iter_mut().find(|a| a.drug == action.drug) {
            Some(existing) => {
                if action.action.more_conservative_than(&existing.action) {
                    *existing = action;
                }
            }
            None => merged.push(action),
        }
    }
    merged
}
