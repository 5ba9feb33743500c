//! Dose resolution along eGFR-banded titration ladders.
//!
//! The ladder is an ordered dose sequence per eGFR band; resolving a dose is
//! an index lookup, not a search. Per-drug overrides shadow the class ladder.

use crate::result::DoseOutcome;
use glycora_common::{GlycoraError, PatientProfile, Result};
use glycora_config::ConfigStore;

/// Resolve the dose instruction for a selected drug.
///
/// Returns `NoDoseRuleForBand` when the patient's eGFR falls outside every
/// configured band, or when the class has no ladder at all — both are data
/// gaps to surface, not clinical judgments.
pub fn resolve(drug_id: &str, store: &ConfigStore, profile: &PatientProfile) -> Result<DoseOutcome> {
    let Some((class_name, _)) = store.class_of(drug_id) else {
        return Err(GlycoraError::ConfigValidation(format!(
            "dose requested for unknown drug {drug_id}"
        )));
    };

    let ladder = store.ladder_for(drug_id, class_name).ok_or_else(|| {
        GlycoraError::NoDoseRuleForBand { class: class_name.to_string(), egfr: profile.egfr }
    })?;

    let band = ladder.band_for(profile.egfr).ok_or_else(|| {
        GlycoraError::NoDoseRuleForBand { class: class_name.to_string(), egfr: profile.egfr }
    })?;

    let schedule = if ladder.weekly { "weekly" } else { "daily" };
    let format_dose = |amount: f64| format!("{amount} {} {schedule}", ladder.unit.as_str());

    let current = profile.med_for_drug(drug_id);
    let Some(med) = current else {
        // Not on the drug: band starting dose. Band steps are validated
        // non-empty at load.
        return Ok(match band.steps.first() {
            Some(first) => DoseOutcome::Start { dose: format_dose(*first) },
            None => DoseOutcome::Unresolved { reason: "empty titration ladder".to_string() },
        });
    };

    let Some(dose) = med.dose else {
        return Ok(DoseOutcome::Unresolved {
            reason: format!("current dose of {drug_id} could not be parsed"),
        });
    };

    let amount = dose.ladder_amount(ladder.weekly);
    match band.steps.iter().find(|step| **step > amount + 1e-9) {
        Some(next) => Ok(DoseOutcome::Increase { dose: format_dose(*next) }),
        None => Ok(DoseOutcome::AtMaximum),
    }
}
