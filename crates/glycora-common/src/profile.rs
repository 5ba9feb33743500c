//! Canonical patient snapshot consumed by every scoring component.
//!
//! A `PatientProfile` is built once per request by the normalizer and is
//! immutable afterwards. Collections use `BTreeSet`/`BTreeMap` so that
//! iteration order, and therefore every downstream decision, is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Insurance ────────────────────────────────────────────────────────────────

/// Insurance category driving the coverage adjustment. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Insurance {
    Va,
    Medicare,
    Medicaid,
    Uninsured,
    Private,
}

impl Insurance {
    /// Map a free-text insurance field to a category.
    /// Unrecognized non-empty values fall back to `Private`.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        // "va" must match as its own word: "private" and "advantage" both
        // contain the substring.
        let va_token = lower.split_whitespace().any(|w| w == "va");
        if lower.is_empty() || lower.contains("no insurance") || lower.contains("uninsured") {
            Insurance::Uninsured
        } else if va_token || lower.contains("veteran") {
            Insurance::Va
        } else if lower.contains("medicare") {
            Insurance::Medicare
        } else if lower.contains("medicaid") {
            Insurance::Medicaid
        } else {
            Insurance::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Insurance::Va => "va",
            Insurance::Medicare => "medicare",
            Insurance::Medicaid => "medicaid",
            Insurance::Uninsured => "uninsured",
            Insurance::Private => "private",
        }
    }
}

// ── A1C goal band ────────────────────────────────────────────────────────────

/// The three A1C-goal tiers selecting a target-range table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalTier {
    Lt7,
    Lt7_5,
    Lt8,
}

impl GoalTier {
    pub fn from_goal(goal: f64) -> Self {
        if goal <= 7.0 {
            GoalTier::Lt7
        } else if goal <= 7.5 {
            GoalTier::Lt7_5
        } else {
            GoalTier::Lt8
        }
    }

    /// Key into the goal-band table.
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalTier::Lt7 => "lt7",
            GoalTier::Lt7_5 => "lt7_5",
            GoalTier::Lt8 => "lt8",
        }
    }
}

// ── Doses ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseUnit {
    Mg,
    Units,
}

impl DoseUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseUnit::Mg => "mg",
            DoseUnit::Units => "units",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseFrequency {
    Daily,
    Bid,
    Tid,
    Weekly,
}

/// A dose as stated on the request, already split into amount and schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedDose {
    /// Amount per administration.
    pub amount: f64,
    pub unit: DoseUnit,
    pub frequency: DoseFrequency,
}

impl ParsedDose {
    /// Total amount per day. Weekly doses are compared per-administration
    /// against weekly ladders, not through this.
    pub fn per_day(&self) -> f64 {
        match self.frequency {
            DoseFrequency::Daily => self.amount,
            DoseFrequency::Bid => self.amount * 2.0,
            DoseFrequency::Tid => self.amount * 3.0,
            DoseFrequency::Weekly => self.amount / 7.0,
        }
    }

    /// Amount used when walking a titration ladder of the given frequency.
    pub fn ladder_amount(&self, ladder_is_weekly: bool) -> f64 {
        if ladder_is_weekly {
            self.amount
        } else {
            self.per_day()
        }
    }
}

// ── Medications & glucose ────────────────────────────────────────────────────

/// One active medication after normalization. `drug_id`/`class` stay `None`
/// when the raw name could not be resolved; such entries are retained but do
/// not participate in class matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMedication {
    pub raw_name: String,
    pub drug_id: Option<String>,
    pub class: Option<String>,
    pub dose: Option<ParsedDose>,
}

/// Glucose picture for the request: measured averages when readings exist,
/// A1C-derived estimates otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlucoseSummary {
    pub fasting_avg: Option<f64>,
    pub post_prandial_avg: Option<f64>,
    pub fasting_lows: bool,
    pub post_prandial_lows: bool,
    pub overnight_lows: bool,
    /// Lows reported without timing: a CGM low flag, or a hypoglycemia
    /// history recorded as a comorbidity.
    pub untimed_lows: bool,
    /// True when the averages were estimated from A1C rather than measured.
    pub estimated_from_a1c: bool,
}

impl GlucoseSummary {
    pub fn lows_documented(&self) -> bool {
        self.fasting_lows || self.post_prandial_lows || self.overnight_lows || self.untimed_lows
    }
}

// ── Profile ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub egfr: f64,
    pub a1c: Option<f64>,
    pub age: Option<f64>,
    pub goal: f64,
    pub goal_tier: GoalTier,
    /// Uppercased comorbidity codes (ASCVD, CKD, CHF, ...).
    pub comorbidities: BTreeSet<String>,
    /// Lowercased allergy labels matched against class allergy labels.
    pub allergy_labels: BTreeSet<String>,
    /// Specific drug ids the patient reacts to (granular allergies).
    pub allergy_drugs: BTreeSet<String>,
    pub insurance: Insurance,
    pub cannot_afford_copay: bool,
    pub uses_cgm: bool,
    pub medications: Vec<CurrentMedication>,
    pub glucose: GlucoseSummary,
}

impl PatientProfile {
    pub fn has_comorbidity(&self, code: &str) -> bool {
        self.comorbidities.contains(&code.to_uppercase())
    }

    pub fn on_class(&self, class: &str) -> bool {
        self.med_for_class(class).is_some()
    }

    /// First active medication resolved to the given class.
    pub fn med_for_class(&self, class: &str) -> Option<&CurrentMedication> {
        self.medications
            .iter()
            .find(|m| m.class.as_deref() == Some(class))
    }

    pub fn on_drug(&self, drug_id: &str) -> bool {
        self.med_for_drug(drug_id).is_some()
    }

    pub fn med_for_drug(&self, drug_id: &str) -> Option<&CurrentMedication> {
        self.medications
            .iter()
            .find(|m| m.drug_id.as_deref() == Some(drug_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insurance_parse() {
        assert_eq!(Insurance::parse("VA benefits"), Insurance::Va);
        assert_eq!(Insurance::parse("veteran affairs"), Insurance::Va);
        assert_eq!(Insurance::parse("Medicare Part D"), Insurance::Medicare);
        assert_eq!(Insurance::parse("medicaid"), Insurance::Medicaid);
        assert_eq!(Insurance::parse("No Insurance"), Insurance::Uninsured);
        assert_eq!(Insurance::parse(""), Insurance::Uninsured);
        assert_eq!(Insurance::parse("Blue Cross PPO"), Insurance::Private);
        assert_eq!(Insurance::parse("private"), Insurance::Private);
        assert_eq!(Insurance::parse("Medicare Advantage"), Insurance::Medicare);
    }

    #[test]
    fn test_goal_tier_boundaries() {
        assert_eq!(GoalTier::from_goal(6.5), GoalTier::Lt7);
        assert_eq!(GoalTier::from_goal(7.0), GoalTier::Lt7);
        assert_eq!(GoalTier::from_goal(7.2), GoalTier::Lt7_5);
        assert_eq!(GoalTier::from_goal(7.5), GoalTier::Lt7_5);
        assert_eq!(GoalTier::from_goal(8.0), GoalTier::Lt8);
    }

    #[test]
    fn test_parsed_dose_per_day() {
        let bid = ParsedDose {
            amount: 500.0,
            unit: DoseUnit::Mg,
            frequency: DoseFrequency::Bid,
        };
        assert_eq!(bid.per_day(), 1000.0);
        assert_eq!(bid.ladder_amount(false), 1000.0);

        let weekly = ParsedDose {
            amount: 1.0,
            unit: DoseUnit::Mg,
            frequency: DoseFrequency::Weekly,
        };
        assert_eq!(weekly.ladder_amount(true), 1.0);
    }

    #[test]
    fn test_profile_class_lookup() {
        let profile = PatientProfile {
            egfr: 90.0,
            a1c: Some(8.0),
            age: Some(55.0),
            goal: 7.0,
            goal_tier: GoalTier::Lt7,
            comorbidities: ["ASCVD".to_string()].into_iter().collect(),
            allergy_labels: BTreeSet::new(),
            allergy_drugs: BTreeSet::new(),
            insurance: Insurance::Private,
            cannot_afford_copay: false,
            uses_cgm: false,
            medications: vec![CurrentMedication {
                raw_name: "metformin 500 mg".to_string(),
                drug_id: Some("metformin".to_string()),
                class: Some("Metformin".to_string()),
                dose: None,
            }],
            glucose: GlucoseSummary::default(),
        };
        assert!(profile.on_class("Metformin"));
        assert!(profile.on_drug("metformin"));
        assert!(!profile.on_class("SGLT2"));
        assert!(profile.has_comorbidity("ascvd"));
    }
}
