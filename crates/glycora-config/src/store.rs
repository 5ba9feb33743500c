//! Immutable configuration store.
//!
//! Loads the three rule tables at startup, validates referential integrity,
//! and is shared read-only for the lifetime of the process. A validation
//! failure is fatal; requests never see a partially valid store.

use crate::tables::{DoseLadder, DosingTable, DrugClassDef, DrugDef, FormularyTable, GlucoseTable};
use glycora_common::{GlycoraError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    pub formulary: FormularyTable,
    pub dosing: DosingTable,
    pub glucose: GlucoseTable,
}

impl ConfigStore {
    /// Build a store from already-deserialized tables, validating them.
    pub fn new(
        formulary: FormularyTable,
        dosing: DosingTable,
        glucose: GlucoseTable,
    ) -> Result<Self> {
        let store = ConfigStore { formulary, dosing, glucose };
        store.validate()?;
        Ok(store)
    }

    /// Load `formulary`, `dosing` and `glucose` tables from a directory.
    /// Each table may be `<name>.json` or `<name>.yaml`.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let formulary: FormularyTable = load_table(dir, "formulary")?;
        let dosing: DosingTable = load_table(dir, "dosing")?;
        let glucose: GlucoseTable = load_table(dir, "glucose")?;
        info!(
            formulary_version = %formulary.version,
            dosing_version = %dosing.version,
            glucose_version = %glucose.version,
            classes = formulary.classes.len(),
            drugs = formulary.drugs.len(),
            "rule tables loaded"
        );
        Self::new(formulary, dosing, glucose)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn drug(&self, drug_id: &str) -> Option<&DrugDef> {
        self.formulary.drugs.get(drug_id)
    }

    pub fn class(&self, class: &str) -> Option<&DrugClassDef> {
        self.formulary.classes.get(class)
    }

    /// Class definition owning the given drug. Referential integrity is
    /// checked at load, so a known drug always resolves.
    pub fn class_of(&self, drug_id: &str) -> Option<(&str, &DrugClassDef)> {
        let drug = self.drug(drug_id)?;
        let def = self.class(&drug.class)?;
        Some((drug.class.as_str(), def))
    }

    /// Titration ladder for a drug: the per-drug override when one exists,
    /// the class ladder otherwise.
    pub fn ladder_for(&self, drug_id: &str, class: &str) -> Option<&DoseLadder> {
        self.dosing
            .by_drug
            .get(drug_id)
            .or_else(|| self.dosing.ladders.get(class))
    }

    /// Resolve a raw drug name or brand name to a drug id, case-insensitive.
    pub fn resolve_drug_name(&self, raw: &str) -> Option<&str> {
        let needle = raw.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        for (id, drug) in &self.formulary.drugs {
            if id.to_lowercase() == needle
                || drug.display_name.to_lowercase() == needle
                || drug.brand_names.iter().any(|b| b.to_lowercase() == needle)
            {
                return Some(id.as_str());
            }
        }
        // Brand given in parentheses, e.g. "semaglutide (Ozempic)"
        if let Some(open) = needle.find('(') {
            let bare = needle[..open].trim();
            return self.resolve_drug_name(bare);
        }
        None
    }

    // ── Validation ───────────────────────────────────────────────────────────

    fn validate(&self) -> Result<()> {
        let f = &self.formulary;

        for (id, drug) in &f.drugs {
            if !f.classes.contains_key(&drug.class) {
                return Err(invalid(format!(
                    "drug {id} references unknown class {}",
                    drug.class
                )));
            }
            check_unit_interval(&format!("drug {id} clinical_base"), drug.clinical_base)?;
        }

        for (class, def) in &f.classes {
            if !(1..=4).contains(&def.formulary_tier) {
                return Err(invalid(format!(
                    "class {class} formulary_tier {} outside 1..=4",
                    def.formulary_tier
                )));
            }
            check_unit_interval(&format!("class {class} base_access_score"), def.base_access_score)?;
        }

        for (form, class) in &self.dosing.form_to_class {
            if !f.classes.contains_key(class) {
                return Err(invalid(format!(
                    "form_to_class entry {form} references unknown class {class}"
                )));
            }
        }
        for (class, drug) in &self.dosing.default_drug_by_class {
            if !f.classes.contains_key(class) {
                return Err(invalid(format!(
                    "default_drug_by_class key {class} is not a known class"
                )));
            }
            if !f.drugs.contains_key(drug) {
                return Err(invalid(format!(
                    "default drug {drug} for class {class} is not a known drug"
                )));
            }
        }
        for (class, ladder) in &self.dosing.ladders {
            if !f.classes.contains_key(class) {
                return Err(invalid(format!("ladder key {class} is not a known class")));
            }
            validate_ladder(&format!("class {class}"), ladder)?;
            self.check_floor_alignment(class, ladder)?;
        }
        for (drug_id, ladder) in &self.dosing.by_drug {
            if !f.drugs.contains_key(drug_id) {
                return Err(invalid(format!("by_drug key {drug_id} is not a known drug")));
            }
            validate_ladder(&format!("drug {drug_id}"), ladder)?;
        }

        for tier in ["lt7", "lt7_5", "lt8"] {
            if !self.glucose.goal_bands.contains_key(tier) {
                return Err(invalid(format!("goal band {tier} missing")));
            }
        }
        for class in self.glucose.potency.keys().chain(self.glucose.potency_on_therapy.keys()) {
            if !f.classes.contains_key(class) {
                return Err(invalid(format!("potency entry {class} is not a known class")));
            }
        }
        validate_curve("a1c_to_fasting", &self.glucose.a1c_to_fasting)?;
        validate_curve("a1c_to_post_prandial", &self.glucose.a1c_to_post_prandial)?;

        Ok(())
    }

    /// A class ladder must not start below the eGFR floor encoded by any
    /// deny rule of a drug in that class; otherwise dosing could resolve a
    /// dose for a patient the deny rule already excluded.
    fn check_floor_alignment(&self, class: &str, ladder: &DoseLadder) -> Result<()> {
        let ladder_floor = ladder
            .bands
            .iter()
            .map(|b| b.min_egfr)
            .fold(f64::INFINITY, f64::min);

        for (drug_id, drug) in &self.formulary.drugs {
            if drug.class != class || self.dosing.by_drug.contains_key(drug_id) {
                continue;
            }
            for rule in &drug.deny_if {
                if let Some(deny_floor) = rule.when.egfr_floor() {
                    if ladder_floor < deny_floor {
                        return Err(invalid(format!(
                            "class {class} ladder starts at eGFR {ladder_floor} but drug \
                             {drug_id} is denied below eGFR {deny_floor}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> GlycoraError {
    GlycoraError::ConfigValidation(msg)
}

fn check_unit_interval(what: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{what} = {value} outside [0, 1]")));
    }
    Ok(())
}

fn validate_ladder(what: &str, ladder: &DoseLadder) -> Result<()> {
    if ladder.bands.is_empty() {
        return Err(invalid(format!("{what} ladder has no eGFR bands")));
    }
    let mut prev_band_max: Option<(f64, f64)> = None; // (min_egfr, max step)
    for band in &ladder.bands {
        if band.steps.is_empty() {
            return Err(invalid(format!("{what} band at eGFR {} has no steps", band.min_egfr)));
        }
        if band.steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(format!(
                "{what} band at eGFR {} steps are not strictly ascending",
                band.min_egfr
            )));
        }
        if let Some(hi) = band.max_egfr {
            if hi <= band.min_egfr {
                return Err(invalid(format!("{what} band has max_egfr {hi} <= min_egfr")));
            }
        }
        // Dosing monotonicity: a lower band never allows a higher max dose.
        if let (Some((prev_min, prev_max)), Some(max)) = (prev_band_max, band.max_step()) {
            let (lower, higher) = if band.min_egfr < prev_min {
                (max, prev_max)
            } else {
                (prev_max, max)
            };
            if lower > higher {
                return Err(invalid(format!(
                    "{what} ladder violates dose monotonicity across eGFR bands"
                )));
            }
        }
        if let Some(max) = band.max_step() {
            prev_band_max = Some((band.min_egfr, max));
        }
    }
    Ok(())
}

fn validate_curve(what: &str, curve: &[crate::tables::CurvePoint]) -> Result<()> {
    if curve.len() < 2 {
        return Err(invalid(format!("{what} curve needs at least two points")));
    }
    if curve.windows(2).any(|w| w[0].a1c >= w[1].a1c) {
        return Err(invalid(format!("{what} curve points are not strictly ascending in A1C")));
    }
    Ok(())
}

fn load_table<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let json_path = dir.join(format!("{name}.json"));
    if json_path.exists() {
        let content = std::fs::read_to_string(&json_path)?;
        return Ok(serde_json::from_str(&content)?);
    }
    let yaml_path = dir.join(format!("{name}.yaml"));
    if yaml_path.exists() {
        let content = std::fs::read_to_string(&yaml_path)?;
        return Ok(serde_yaml::from_str(&content)?);
    }
    Err(invalid(format!(
        "table {name} not found in {} (expected {name}.json or {name}.yaml)",
        dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{CmpOp, Condition, DenyRule, NumericField};
    use crate::tables::*;
    use glycora_common::profile::DoseUnit;
    use std::collections::BTreeMap;

    fn minimal_tables() -> (FormularyTable, DosingTable, GlucoseTable) {
        let mut classes = BTreeMap::new();
        classes.insert(
            "Metformin".to_string(),
            DrugClassDef {
                display_name: "Metformin".to_string(),
                cost_tier: CostTier::Low,
                formulary_tier: 1,
                base_access_score: 0.8,
                allergy_labels: vec!["biguanide".to_string()],
                va_pdf: true,
                prior_auth: false,
                cgm_benefit: false,
                hypoglycemia_risk: false,
                postprandial_hypo_risk: false,
                affordable: true,
            },
        );
        let mut drugs = BTreeMap::new();
        drugs.insert(
            "metformin".to_string(),
            DrugDef {
                class: "Metformin".to_string(),
                display_name: "Metformin".to_string(),
                clinical_base: 0.7,
                deny_if: vec![DenyRule {
                    when: Condition::Numeric {
                        field: NumericField::Egfr,
                        op: CmpOp::Lt,
                        value: 30.0,
                        upper: None,
                    },
                    reason: "contraindicated below eGFR 30".to_string(),
                }],
                clinical_boost: vec![],
                caution_if: vec![],
                drug_in_class_bonus: 0.0,
                goal_band_bonus: false,
                brand_names: vec!["Glucophage".to_string()],
            },
        );
        let formulary = FormularyTable {
            version: "1".to_string(),
            classes,
            drugs,
            current_therapy_boost: 0.20,
        };

        let mut ladders = BTreeMap::new();
        ladders.insert(
            "Metformin".to_string(),
            DoseLadder {
                unit: DoseUnit::Mg,
                weekly: false,
                bands: vec![
                    EgfrBand {
                        min_egfr: 45.0,
                        max_egfr: None,
                        steps: vec![500.0, 1000.0, 1500.0, 2000.0],
                    },
                    EgfrBand {
                        min_egfr: 30.0,
                        max_egfr: Some(45.0),
                        steps: vec![500.0, 1000.0],
                    },
                ],
            },
        );
        let dosing = DosingTable {
            version: "1".to_string(),
            form_to_class: [("biguanides".to_string(), "Metformin".to_string())]
                .into_iter()
                .collect(),
            default_drug_by_class: [("Metformin".to_string(), "metformin".to_string())]
                .into_iter()
                .collect(),
            ladders,
            by_drug: BTreeMap::new(),
        };

        let band = GoalBand {
            fasting: TargetRange {
                reduce_below: 80.0,
                ok_min: 80.0,
                ok_max: 130.0,
                increase_at: 150.0,
            },
            post_prandial: TargetRange {
                reduce_below: 100.0,
                ok_min: 100.0,
                ok_max: 180.0,
                increase_at: 200.0,
            },
        };
        let glucose = GlucoseTable {
            version: "1".to_string(),
            goal_bands: [
                ("lt7".to_string(), band),
                ("lt7_5".to_string(), band),
                ("lt8".to_string(), band),
            ]
            .into_iter()
            .collect(),
            a1c_to_fasting: vec![
                CurvePoint { a1c: 6.5, glucose: 120.0 },
                CurvePoint { a1c: 9.7, glucose: 226.7 },
            ],
            a1c_to_post_prandial: vec![
                CurvePoint { a1c: 6.5, glucose: 140.0 },
                CurvePoint { a1c: 11.0, glucose: 269.0 },
            ],
            potency: [(
                "Metformin".to_string(),
                Potency { fasting: 60.0, post_prandial: 60.0 },
            )]
            .into_iter()
            .collect(),
            potency_on_therapy: BTreeMap::new(),
            goal_bonus_tight: 0.05,
            goal_bonus_moderate: 0.03,
            potency_axis_bonus: 0.05,
            on_therapy_bonus: 0.05,
        };
        (formulary, dosing, glucose)
    }

    #[test]
    fn test_valid_store_loads() {
        let (f, d, g) = minimal_tables();
        let store = ConfigStore::new(f, d, g).unwrap();
        assert!(store.drug("metformin").is_some());
        assert_eq!(store.class_of("metformin").unwrap().0, "Metformin");
    }

    #[test]
    fn test_dangling_class_is_fatal() {
        let (mut f, d, g) = minimal_tables();
        f.drugs.get_mut("metformin").unwrap().class = "Nonexistent".to_string();
        let err = ConfigStore::new(f, d, g).unwrap_err();
        assert!(err.to_string().contains("unknown class"));
    }

    #[test]
    fn test_ladder_below_deny_floor_is_fatal() {
        let (f, mut d, g) = minimal_tables();
        // Band starting at eGFR 10 contradicts the deny-below-30 rule.
        d.ladders.get_mut("Metformin").unwrap().bands.push(EgfrBand {
            min_egfr: 10.0,
            max_egfr: Some(30.0),
            steps: vec![250.0],
        });
        let err = ConfigStore::new(f, d, g).unwrap_err();
        assert!(err.to_string().contains("denied below"));
    }

    #[test]
    fn test_non_monotonic_ladder_is_fatal() {
        let (f, mut d, g) = minimal_tables();
        // Lower eGFR band allowing a higher max dose than the band above it.
        d.ladders.get_mut("Metformin").unwrap().bands[1].steps = vec![500.0, 4000.0];
        let err = ConfigStore::new(f, d, g).unwrap_err();
        assert!(err.to_string().contains("monotonicity"));
    }

    #[test]
    fn test_brand_name_resolution() {
        let (f, d, g) = minimal_tables();
        let store = ConfigStore::new(f, d, g).unwrap();
        assert_eq!(store.resolve_drug_name("Glucophage"), Some("metformin"));
        assert_eq!(store.resolve_drug_name("METFORMIN"), Some("metformin"));
        assert_eq!(store.resolve_drug_name("metformin (Glucophage)"), Some("metformin"));
        assert_eq!(store.resolve_drug_name("aspirin"), None);
    }
}
