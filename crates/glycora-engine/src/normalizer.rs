//! Request normalization: raw intake record → canonical `PatientProfile`.

use crate::dose_parse::parse_dose;
use crate::glucose::estimate_from_a1c;
use crate::request::{AllergyEntry, MedicationEntry, PatientRequest};
use glycora_common::profile::{CurrentMedication, GlucoseSummary, GoalTier, Insurance};
use glycora_common::{GlycoraError, PatientProfile, Result};
use glycora_config::ConfigStore;
use std::collections::BTreeSet;
use tracing::debug;

/// Build the immutable profile every scorer consumes. Pure function of the
/// request and the store.
///
/// Fails with `IncompletePatientData` when eGFR is missing or when no glucose
/// signal (reading, CGM average, or A1C) is available. Absent optional fields
/// default to "not present", never to a guess.
pub fn build_profile(req: &PatientRequest, store: &ConfigStore) -> Result<PatientProfile> {
    let egfr = req
        .egfr
        .ok_or_else(|| GlycoraError::IncompletePatientData("eGFR is required".to_string()))?;

    let medications: Vec<CurrentMedication> = req
        .medications
        .iter()
        .map(|m| resolve_medication(m, store))
        .collect();

    let (allergy_labels, allergy_drugs) = resolve_allergies(&req.allergies, store);

    let comorbidities: BTreeSet<String> = req
        .comorbidities
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    let glucose = summarize_glucose(req, store, &comorbidities)?;

    let insurance = match req.insurance.as_deref() {
        Some(raw) => Insurance::parse(raw),
        None => Insurance::Uninsured,
    };

    let profile = PatientProfile {
        egfr,
        a1c: req.a1c,
        age: req.age,
        goal: req.a1c_goal,
        goal_tier: GoalTier::from_goal(req.a1c_goal),
        comorbidities,
        allergy_labels,
        allergy_drugs,
        insurance,
        cannot_afford_copay: req.cannot_afford_copay,
        uses_cgm: req.glucose.as_ref().is_some_and(|g| g.cgm.is_some()),
        medications,
        glucose,
    };
    debug!(
        egfr = profile.egfr,
        goal = profile.goal,
        meds = profile.medications.len(),
        insurance = profile.insurance.as_str(),
        "profile built"
    );
    Ok(profile)
}

/// Resolve one medication entry. The form value maps to a class; the name or
/// brand maps to a drug id. Unresolvable entries are kept with both unset.
fn resolve_medication(entry: &MedicationEntry, store: &ConfigStore) -> CurrentMedication {
    let raw_name = entry
        .name
        .clone()
        .or_else(|| entry.form.clone())
        .unwrap_or_default();

    let drug_id = entry
        .name
        .as_deref()
        .and_then(|n| store.resolve_drug_name(n))
        .map(str::to_string);

    let class = drug_id
        .as_deref()
        .and_then(|id| store.class_of(id))
        .map(|(c, _)| c.to_string())
        .or_else(|| {
            entry
                .form
                .as_deref()
                .and_then(|f| store.dosing.form_to_class.get(&f.trim().to_lowercase()))
                .cloned()
        });

    let dose = entry.dose.as_deref().and_then(parse_dose);

    CurrentMedication { raw_name, drug_id, class, dose }
}

/// Expand reported allergies. Open-to-trial allergies with named drugs only
/// exclude those drugs; anything else excludes the whole class by label.
fn resolve_allergies(
    entries: &[AllergyEntry],
    store: &ConfigStore,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut labels = BTreeSet::new();
    let mut drugs = BTreeSet::new();
    for entry in entries {
        if entry.open_to_trial && !entry.specific_drugs.is_empty() {
            for raw in &entry.specific_drugs {
                if let Some(id) = store.resolve_drug_name(raw) {
                    drugs.insert(id.to_string());
                }
            }
        } else {
            labels.insert(entry.allergen.trim().to_lowercase());
        }
    }
    (labels, drugs)
}

fn summarize_glucose(
    req: &PatientRequest,
    store: &ConfigStore,
    comorbidities: &BTreeSet<String>,
) -> Result<GlucoseSummary> {
    let input = req.glucose.clone().unwrap_or_default();
    let cgm = input.cgm.clone().unwrap_or_default();

    let mut fasting_avg = average(&input.fasting_readings).or(cgm.wake_up_average);
    let mut post_prandial_avg = average(&input.post_prandial_readings).or(cgm.bedtime_average);
    let mut estimated = false;

    if fasting_avg.is_none() && post_prandial_avg.is_none() {
        match req.a1c {
            Some(a1c) => {
                fasting_avg = estimate_from_a1c(a1c, &store.glucose.a1c_to_fasting);
                post_prandial_avg = estimate_from_a1c(a1c, &store.glucose.a1c_to_post_prandial);
                estimated = true;
            }
            None => {
                return Err(GlycoraError::IncompletePatientData(
                    "no glucose signal: supply readings, CGM averages, or A1C".to_string(),
                ));
            }
        }
    }

    // A hypoglycemia history carried as a comorbidity counts as documented
    // lows even when the request has no low flags at all.
    let hypo_history = comorbidities.contains("FREQUENT HYPOGLYCEMIA")
        || comorbidities.contains("HISTORY OF HYPOGLYCEMIA");

    Ok(GlucoseSummary {
        fasting_avg,
        post_prandial_avg,
        fasting_lows: input.fasting_lows,
        post_prandial_lows: input.post_prandial_lows,
        overnight_lows: input.overnight_lows || cgm.overnight_lows,
        // CGM low detection carries no timing; it gets its own slot rather
        // than being folded into the fasting flag.
        untimed_lows: cgm.lows_detected || hypo_history,
        estimated_from_a1c: estimated,
    })
}

fn average(readings: &[f64]) -> Option<f64> {
    if readings.is_empty() {
        None
    } else {
        Some(readings.iter().sum::<f64>() / readings.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CgmInput, GlucoseInput};
    use glycora_test_utils::demo_store;

    fn base_request() -> PatientRequest {
        serde_json::from_str(r#"{"egfr": 90.0, "a1c": 8.5}"#).unwrap()
    }

    #[test]
    fn test_missing_egfr_rejected() {
        let store = demo_store();
        let mut req = base_request();
        req.egfr = None;
        let err = build_profile(&req, &store).unwrap_err();
        assert!(matches!(err, GlycoraError::IncompletePatientData(_)));
    }

    #[test]
    fn test_missing_glucose_signal_rejected() {
        let store = demo_store();
        let mut req = base_request();
        req.a1c = None;
        let err = build_profile(&req, &store).unwrap_err();
        assert!(err.to_string().contains("glucose signal"));
    }

    #[test]
    fn test_a1c_estimation_used_without_readings() {
        let store = demo_store();
        let profile = build_profile(&base_request(), &store).unwrap();
        assert!(profile.glucose.estimated_from_a1c);
        assert!(profile.glucose.fasting_avg.is_some());
        assert!(profile.glucose.post_prandial_avg.is_some());
    }

    #[test]
    fn test_readings_win_over_estimation() {
        let store = demo_store();
        let mut req = base_request();
        req.glucose = Some(GlucoseInput {
            fasting_readings: vec![150.0, 170.0],
            ..Default::default()
        });
        let profile = build_profile(&req, &store).unwrap();
        assert!(!profile.glucose.estimated_from_a1c);
        assert_eq!(profile.glucose.fasting_avg, Some(160.0));
    }

    #[test]
    fn test_cgm_averages_fill_in() {
        let store = demo_store();
        let mut req = base_request();
        req.glucose = Some(GlucoseInput {
            cgm: Some(CgmInput {
                wake_up_average: Some(145.0),
                bedtime_average: Some(190.0),
                lows_detected: true,
                overnight_lows: false,
            }),
            ..Default::default()
        });
        let profile = build_profile(&req, &store).unwrap();
        assert_eq!(profile.glucose.fasting_avg, Some(145.0));
        assert_eq!(profile.glucose.post_prandial_avg, Some(190.0));
        // CGM lows carry no timing, so they never become fasting lows.
        assert!(profile.glucose.untimed_lows);
        assert!(!profile.glucose.fasting_lows);
        assert!(profile.glucose.lows_documented());
        assert!(profile.uses_cgm);
    }

    #[test]
    fn test_hypoglycemia_history_counts_as_lows() {
        let store = demo_store();
        let mut req = base_request();
        req.comorbidities = vec!["Frequent Hypoglycemia".to_string()];
        let profile = build_profile(&req, &store).unwrap();
        assert!(profile.glucose.untimed_lows);
        assert!(profile.glucose.lows_documented());

        let mut req = base_request();
        req.comorbidities = vec!["History of Hypoglycemia".to_string()];
        let profile = build_profile(&req, &store).unwrap();
        assert!(profile.glucose.untimed_lows);
    }

    #[test]
    fn test_medication_resolution_by_name_and_form() {
        let store = demo_store();
        let mut req = base_request();
        req.medications = vec![
            serde_json::from_str(r#"{"name": "metformin", "dose": "500 mg BID"}"#).unwrap(),
            serde_json::from_str(r#"{"form": "glp1_gip"}"#).unwrap(),
            serde_json::from_str(r#"{"name": "mystery pill"}"#).unwrap(),
        ];
        let profile = build_profile(&req, &store).unwrap();
        assert_eq!(profile.medications[0].drug_id.as_deref(), Some("metformin"));
        assert_eq!(profile.medications[0].class.as_deref(), Some("Metformin"));
        assert_eq!(profile.medications[0].dose.map(|d| d.per_day()), Some(1000.0));
        assert_eq!(profile.medications[1].class.as_deref(), Some("GLP1"));
        assert!(profile.medications[1].drug_id.is_none());
        assert!(profile.medications[2].class.is_none());
    }

    #[test]
    fn test_allergy_expansion() {
        let store = demo_store();
        let mut req = base_request();
        req.allergies = vec![
            serde_json::from_str(
                r#"{"allergen": "sulfonylurea", "specificDrugs": ["glipizide"], "openToTrial": true}"#,
            )
            .unwrap(),
            serde_json::from_str(r#"{"allergen": "GLP-1"}"#).unwrap(),
        ];
        let profile = build_profile(&req, &store).unwrap();
        assert!(profile.allergy_drugs.contains("glipizide"));
        assert!(profile.allergy_labels.contains("glp-1"));
        // Open-to-trial kept the rest of the sulfonylurea class available.
        assert!(!profile.allergy_labels.contains("sulfonylurea"));
    }
}
