//! Raw patient request as supplied by the intake collaborator.

use serde::{Deserialize, Serialize};

fn default_goal() -> f64 { 7.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRequest {
    pub egfr: Option<f64>,
    pub a1c: Option<f64>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default = "default_goal")]
    pub a1c_goal: f64,
    #[serde(default)]
    pub comorbidities: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<AllergyEntry>,
    #[serde(default)]
    pub medications: Vec<MedicationEntry>,
    #[serde(default)]
    pub insurance: Option<String>,
    #[serde(default)]
    pub cannot_afford_copay: bool,
    #[serde(default)]
    pub glucose: Option<GlucoseInput>,
}

/// One current medication. `form` is the intake form value ("biguanides",
/// "glp1_gip", ...); `name` is free text, possibly with a parenthesized brand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub dose: Option<String>,
}

/// Reported allergy. When the patient is open to trialing other agents of
/// the class, only the named drugs are excluded; otherwise the whole class is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergyEntry {
    pub allergen: String,
    #[serde(default)]
    pub specific_drugs: Vec<String>,
    #[serde(default)]
    pub open_to_trial: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseInput {
    #[serde(default)]
    pub fasting_readings: Vec<f64>,
    #[serde(default)]
    pub post_prandial_readings: Vec<f64>,
    #[serde(default)]
    pub fasting_lows: bool,
    #[serde(default)]
    pub post_prandial_lows: bool,
    #[serde(default)]
    pub overnight_lows: bool,
    #[serde(default)]
    pub cgm: Option<CgmInput>,
}

/// Continuous glucose monitor summary; wake-up average stands in for fasting
/// and bedtime average for post-prandial when finger-stick readings are absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgmInput {
    pub wake_up_average: Option<f64>,
    pub bedtime_average: Option<f64>,
    #[serde(default)]
    pub lows_detected: bool,
    #[serde(default)]
    pub overnight_lows: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_request_deserializes() {
        let json = r#"{"egfr": 90.0, "a1c": 8.5}"#;
        let req: PatientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.egfr, Some(90.0));
        assert_eq!(req.a1c_goal, 7.0);
        assert!(req.medications.is_empty());
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{
            "egfr": 45.0,
            "a1cGoal": 7.5,
            "cannotAffordCopay": true,
            "medications": [{"name": "metformin", "dose": "500 mg BID"}],
            "glucose": {"fastingReadings": [140.0, 150.0], "cgm": {"wakeUpAverage": 145.0}}
        }"#;
        let req: PatientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.a1c_goal, 7.5);
        assert!(req.cannot_afford_copay);
        let glucose = req.glucose.unwrap();
        assert_eq!(glucose.fasting_readings.len(), 2);
        assert_eq!(glucose.cgm.unwrap().wake_up_average, Some(145.0));
    }
}
