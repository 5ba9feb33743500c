//! glycora-test-utils — In-code fixture tables for deterministic tests.
//!
//! `demo_store()` builds a realistic eight-class formulary with dosing
//! ladders and glucose tables, mirroring the shape of the shipped config
//! files without touching the filesystem.

use glycora_common::profile::DoseUnit;
use glycora_config::{
    CmpOp, Condition, ConfigStore, CostTier, CurvePoint, DeltaRule, DenyRule, DoseLadder,
    DosingTable, DrugClassDef, DrugDef, EgfrBand, FormularyTable, GlucoseTable, GoalBand,
    NumericField, Potency, TargetRange,
};
use std::collections::BTreeMap;

/// Fixture store shared by unit and integration tests. Panics on invalid
/// fixture data, which is a bug in this crate, not in the caller.
pub fn demo_store() -> ConfigStore {
    match ConfigStore::new(formulary(), dosing(), glucose()) {
        Ok(store) => store,
        Err(e) => panic!("demo fixture tables failed validation: {e}"),
    }
}

// ── Rule helpers ─────────────────────────────────────────────────────────────

fn egfr_below(value: f64) -> Condition {
    Condition::Numeric { field: NumericField::Egfr, op: CmpOp::Lt, value, upper: None }
}

fn egfr_between(lo: f64, hi: f64) -> Condition {
    Condition::Numeric { field: NumericField::Egfr, op: CmpOp::Between, value: lo, upper: Some(hi) }
}

fn comorbidity(codes: &[&str]) -> Condition {
    Condition::Comorbidity { any_of: codes.iter().map(|c| c.to_string()).collect() }
}

fn deny(when: Condition, reason: &str) -> DenyRule {
    DenyRule { when, reason: reason.to_string() }
}

fn delta(when: Condition, delta: f64, label: &str) -> DeltaRule {
    DeltaRule { when, delta, label: label.to_string() }
}

// ── Formulary ────────────────────────────────────────────────────────────────

struct ClassSpec {
    display: &'static str,
    cost: CostTier,
    tier: u8,
    access: f64,
    allergy: &'static [&'static str],
    va_pdf: bool,
    prior_auth: bool,
    cgm: bool,
    hypo: bool,
    pp_hypo: bool,
    affordable: bool,
}

fn class(spec: ClassSpec) -> DrugClassDef {
    DrugClassDef {
        display_name: spec.display.to_string(),
        cost_tier: spec.cost,
        formulary_tier: spec.tier,
        base_access_score: spec.access,
        allergy_labels: spec.allergy.iter().map(|s| s.to_string()).collect(),
        va_pdf: spec.va_pdf,
        prior_auth: spec.prior_auth,
        cgm_benefit: spec.cgm,
        hypoglycemia_risk: spec.hypo,
        postprandial_hypo_risk: spec.pp_hypo,
        affordable: spec.affordable,
    }
}

fn formulary() -> FormularyTable {
    let mut classes = BTreeMap::new();
    classes.insert("Metformin".to_string(), class(ClassSpec {
        display: "Metformin", cost: CostTier::Low, tier: 1, access: 0.85,
        allergy: &["metformin", "biguanide"], va_pdf: true, prior_auth: false,
        cgm: false, hypo: false, pp_hypo: false, affordable: true,
    }));
    classes.insert("SGLT2".to_string(), class(ClassSpec {
        display: "SGLT2 Inhibitor", cost: CostTier::High, tier: 3, access: 0.60,
        allergy: &["sglt2"], va_pdf: true, prior_auth: false,
        cgm: false, hypo: false, pp_hypo: false, affordable: false,
    }));
    classes.insert("GLP1".to_string(), class(ClassSpec {
        display: "GLP-1 Receptor Agonist", cost: CostTier::VeryHigh, tier: 3, access: 0.55,
        allergy: &["glp-1", "glp1"], va_pdf: true, prior_auth: true,
        cgm: true, hypo: false, pp_hypo: false, affordable: false,
    }));
    classes.insert("DPP4".to_string(), class(ClassSpec {
        display: "DPP-4 Inhibitor", cost: CostTier::Medium, tier: 2, access: 0.70,
        allergy: &["dpp-4", "dpp4"], va_pdf: false, prior_auth: false,
        cgm: false, hypo: false, pp_hypo: false, affordable: false,
    }));
    classes.insert("Sulfonylurea".to_string(), class(ClassSpec {
        display: "Sulfonylurea", cost: CostTier::Low, tier: 1, access: 0.80,
        allergy: &["sulfonylurea", "sulfa"], va_pdf: true, prior_auth: false,
        cgm: false, hypo: true, pp_hypo: false, affordable: true,
    }));
    classes.insert("TZD".to_string(), class(ClassSpec {
        display: "Thiazolidinedione", cost: CostTier::Low, tier: 2, access: 0.75,
        allergy: &["tzd", "thiazolidinedione"], va_pdf: true, prior_auth: false,
        cgm: false, hypo: false, pp_hypo: false, affordable: true,
    }));
    classes.insert("Basal Insulin".to_string(), class(ClassSpec {
        display: "Basal Insulin", cost: CostTier::Medium, tier: 2, access: 0.70,
        allergy: &["insulin"], va_pdf: true, prior_auth: false,
        cgm: true, hypo: true, pp_hypo: false, affordable: true,
    }));
    classes.insert("Bolus Insulin".to_string(), class(ClassSpec {
        display: "Bolus Insulin", cost: CostTier::Medium, tier: 2, access: 0.65,
        allergy: &["insulin"], va_pdf: true, prior_auth: false,
        cgm: true, hypo: true, pp_hypo: true, affordable: true,
    }));

    let mut drugs = BTreeMap::new();
    drugs.insert("metformin".to_string(), DrugDef {
        class: "Metformin".to_string(),
        display_name: "Metformin".to_string(),
        clinical_base: 0.70,
        deny_if: vec![deny(egfr_below(30.0), "contraindicated below eGFR 30")],
        clinical_boost: vec![],
        caution_if: vec![delta(egfr_between(30.0, 45.0), 0.05, "reduced dose ceiling at eGFR 30-45")],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: true,
        brand_names: vec!["Glucophage".to_string()],
    });
    drugs.insert("empagliflozin".to_string(), DrugDef {
        class: "SGLT2".to_string(),
        display_name: "Empagliflozin".to_string(),
        clinical_base: 0.62,
        deny_if: vec![deny(egfr_below(20.0), "not initiated below eGFR 20")],
        clinical_boost: vec![
            delta(comorbidity(&["ASCVD"]), 0.10, "cardiovascular benefit"),
            delta(comorbidity(&["CKD"]), 0.12, "renal protection"),
            delta(comorbidity(&["CHF"]), 0.12, "heart failure benefit"),
        ],
        caution_if: vec![delta(egfr_between(20.0, 30.0), 0.05, "reduced glycemic effect at low eGFR")],
        drug_in_class_bonus: 0.05,
        goal_band_bonus: false,
        brand_names: vec!["Jardiance".to_string()],
    });
    drugs.insert("dapagliflozin".to_string(), DrugDef {
        class: "SGLT2".to_string(),
        display_name: "Dapagliflozin".to_string(),
        clinical_base: 0.60,
        deny_if: vec![deny(egfr_below(25.0), "not initiated below eGFR 25")],
        clinical_boost: vec![
            delta(comorbidity(&["CKD"]), 0.12, "renal protection"),
            delta(comorbidity(&["CHF"]), 0.12, "heart failure benefit"),
        ],
        caution_if: vec![],
        drug_in_class_bonus: 0.05,
        goal_band_bonus: false,
        brand_names: vec!["Farxiga".to_string()],
    });
    drugs.insert("canagliflozin".to_string(), DrugDef {
        class: "SGLT2".to_string(),
        display_name: "Canagliflozin".to_string(),
        clinical_base: 0.55,
        deny_if: vec![deny(egfr_below(30.0), "not initiated below eGFR 30")],
        clinical_boost: vec![delta(comorbidity(&["ASCVD"]), 0.08, "cardiovascular benefit")],
        caution_if: vec![],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Invokana".to_string()],
    });
    drugs.insert("semaglutide".to_string(), DrugDef {
        class: "GLP1".to_string(),
        display_name: "Semaglutide".to_string(),
        clinical_base: 0.65,
        deny_if: vec![deny(
            comorbidity(&["MTC", "MEN2"]),
            "personal or family history of medullary thyroid carcinoma",
        )],
        clinical_boost: vec![
            delta(comorbidity(&["ASCVD"]), 0.10, "cardiovascular benefit"),
            delta(comorbidity(&["OBESITY"]), 0.08, "weight reduction"),
        ],
        caution_if: vec![],
        drug_in_class_bonus: 0.05,
        goal_band_bonus: true,
        brand_names: vec!["Ozempic".to_string()],
    });
    drugs.insert("dulaglutide".to_string(), DrugDef {
        class: "GLP1".to_string(),
        display_name: "Dulaglutide".to_string(),
        clinical_base: 0.60,
        deny_if: vec![deny(
            comorbidity(&["MTC", "MEN2"]),
            "personal or family history of medullary thyroid carcinoma",
        )],
        clinical_boost: vec![delta(comorbidity(&["ASCVD"]), 0.08, "cardiovascular benefit")],
        caution_if: vec![],
        drug_in_class_bonus: 0.05,
        goal_band_bonus: false,
        brand_names: vec!["Trulicity".to_string()],
    });
    drugs.insert("sitagliptin".to_string(), DrugDef {
        class: "DPP4".to_string(),
        display_name: "Sitagliptin".to_string(),
        clinical_base: 0.58,
        deny_if: vec![],
        clinical_boost: vec![],
        caution_if: vec![],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Januvia".to_string()],
    });
    drugs.insert("glipizide".to_string(), DrugDef {
        class: "Sulfonylurea".to_string(),
        display_name: "Glipizide".to_string(),
        clinical_base: 0.55,
        deny_if: vec![],
        clinical_boost: vec![],
        caution_if: vec![delta(
            Condition::Numeric { field: NumericField::Age, op: CmpOp::Gte, value: 65.0, upper: None },
            0.05,
            "hypoglycemia risk in older adults",
        )],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Glucotrol".to_string()],
    });
    drugs.insert("glimepiride".to_string(), DrugDef {
        class: "Sulfonylurea".to_string(),
        display_name: "Glimepiride".to_string(),
        clinical_base: 0.53,
        deny_if: vec![],
        clinical_boost: vec![],
        caution_if: vec![delta(egfr_below(45.0), 0.05, "accumulates in renal impairment")],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Amaryl".to_string()],
    });
    drugs.insert("glyburide".to_string(), DrugDef {
        class: "Sulfonylurea".to_string(),
        display_name: "Glyburide".to_string(),
        clinical_base: 0.45,
        deny_if: vec![deny(egfr_below(60.0), "avoid in renal impairment")],
        clinical_boost: vec![],
        caution_if: vec![],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["DiaBeta".to_string()],
    });
    drugs.insert("pioglitazone".to_string(), DrugDef {
        class: "TZD".to_string(),
        display_name: "Pioglitazone".to_string(),
        clinical_base: 0.55,
        deny_if: vec![deny(comorbidity(&["CHF"]), "fluid retention in heart failure")],
        clinical_boost: vec![],
        caution_if: vec![delta(comorbidity(&["OSTEOPOROSIS"]), 0.05, "fracture risk")],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Actos".to_string()],
    });
    drugs.insert("insulin_glargine".to_string(), DrugDef {
        class: "Basal Insulin".to_string(),
        display_name: "Insulin Glargine".to_string(),
        clinical_base: 0.60,
        deny_if: vec![],
        clinical_boost: vec![delta(
            Condition::Numeric { field: NumericField::A1c, op: CmpOp::Gt, value: 9.0, upper: None },
            0.10,
            "marked hyperglycemia",
        )],
        caution_if: vec![],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Lantus".to_string()],
    });
    drugs.insert("insulin_lispro".to_string(), DrugDef {
        class: "Bolus Insulin".to_string(),
        display_name: "Insulin Lispro".to_string(),
        clinical_base: 0.50,
        deny_if: vec![],
        clinical_boost: vec![delta(
            Condition::Numeric {
                field: NumericField::PostPrandialAboveGoal,
                op: CmpOp::Gte,
                value: 40.0,
                upper: None,
            },
            0.08,
            "marked post-prandial excursions",
        )],
        caution_if: vec![],
        drug_in_class_bonus: 0.0,
        goal_band_bonus: false,
        brand_names: vec!["Humalog".to_string()],
    });

    FormularyTable {
        version: "demo-1".to_string(),
        classes,
        drugs,
        current_therapy_boost: 0.20,
    }
}

// ── Dosing ───────────────────────────────────────────────────────────────────

fn mg_ladder(bands: Vec<EgfrBand>) -> DoseLadder {
    DoseLadder { unit: DoseUnit::Mg, weekly: false, bands }
}

fn weekly_mg_ladder(bands: Vec<EgfrBand>) -> DoseLadder {
    DoseLadder { unit: DoseUnit::Mg, weekly: true, bands }
}

fn units_ladder(bands: Vec<EgfrBand>) -> DoseLadder {
    DoseLadder { unit: DoseUnit::Units, weekly: false, bands }
}

fn band(min: f64, max: Option<f64>, steps: &[f64]) -> EgfrBand {
    EgfrBand { min_egfr: min, max_egfr: max, steps: steps.to_vec() }
}

fn dosing() -> DosingTable {
    let mut ladders = BTreeMap::new();
    ladders.insert("Metformin".to_string(), mg_ladder(vec![
        band(45.0, None, &[500.0, 1000.0, 1500.0, 2000.0]),
        band(30.0, Some(45.0), &[500.0, 1000.0]),
    ]));
    ladders.insert("SGLT2".to_string(), mg_ladder(vec![
        band(20.0, None, &[10.0, 25.0]),
    ]));
    ladders.insert("GLP1".to_string(), weekly_mg_ladder(vec![
        band(15.0, None, &[0.25, 0.5, 1.0, 2.0]),
    ]));
    ladders.insert("DPP4".to_string(), mg_ladder(vec![
        band(45.0, None, &[100.0]),
        band(30.0, Some(45.0), &[50.0]),
        band(0.0, Some(30.0), &[25.0]),
    ]));
    ladders.insert("Sulfonylurea".to_string(), mg_ladder(vec![
        band(0.0, None, &[5.0, 10.0, 20.0]),
    ]));
    ladders.insert("TZD".to_string(), mg_ladder(vec![
        band(0.0, None, &[15.0, 30.0, 45.0]),
    ]));
    ladders.insert("Basal Insulin".to_string(), units_ladder(vec![
        band(0.0, None, &[10.0, 20.0, 30.0, 40.0, 50.0]),
    ]));
    ladders.insert("Bolus Insulin".to_string(), units_ladder(vec![
        band(0.0, None, &[4.0, 6.0, 8.0, 10.0, 15.0]),
    ]));

    let mut by_drug = BTreeMap::new();
    by_drug.insert("empagliflozin".to_string(), mg_ladder(vec![
        band(20.0, None, &[10.0, 25.0]),
    ]));
    by_drug.insert("dapagliflozin".to_string(), mg_ladder(vec![
        band(25.0, None, &[5.0, 10.0]),
    ]));
    by_drug.insert("canagliflozin".to_string(), mg_ladder(vec![
        band(60.0, None, &[100.0, 300.0]),
        band(30.0, Some(60.0), &[100.0]),
    ]));
    by_drug.insert("glimepiride".to_string(), mg_ladder(vec![
        band(0.0, None, &[1.0, 2.0, 4.0, 8.0]),
    ]));
    by_drug.insert("glyburide".to_string(), mg_ladder(vec![
        band(60.0, None, &[1.25, 2.5, 5.0, 10.0]),
    ]));
    by_drug.insert("dulaglutide".to_string(), weekly_mg_ladder(vec![
        band(15.0, None, &[0.75, 1.5, 3.0, 4.5]),
    ]));

    DosingTable {
        version: "demo-1".to_string(),
        form_to_class: [
            ("biguanides", "Metformin"),
            ("sglt2", "SGLT2"),
            ("glp1_gip", "GLP1"),
            ("dppiv", "DPP4"),
            ("sulfonylureas", "Sulfonylurea"),
            ("tzd", "TZD"),
            ("basal_insulin", "Basal Insulin"),
            ("bolus_insulin", "Bolus Insulin"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        default_drug_by_class: [
            ("Metformin", "metformin"),
            ("SGLT2", "empagliflozin"),
            ("GLP1", "semaglutide"),
            ("DPP4", "sitagliptin"),
            ("Sulfonylurea", "glipizide"),
            ("TZD", "pioglitazone"),
            ("Basal Insulin", "insulin_glargine"),
            ("Bolus Insulin", "insulin_lispro"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        ladders,
        by_drug,
    }
}

// ── Glucose ──────────────────────────────────────────────────────────────────

fn range(reduce_below: f64, ok_min: f64, ok_max: f64, increase_at: f64) -> TargetRange {
    TargetRange { reduce_below, ok_min, ok_max, increase_at }
}

fn potency(fasting: f64, post_prandial: f64) -> Potency {
    Potency { fasting, post_prandial }
}

fn glucose() -> GlucoseTable {
    let goal_bands = [
        ("lt7", GoalBand {
            fasting: range(80.0, 80.0, 130.0, 150.0),
            post_prandial: range(100.0, 100.0, 180.0, 200.0),
        }),
        ("lt7_5", GoalBand {
            fasting: range(80.0, 80.0, 140.0, 160.0),
            post_prandial: range(100.0, 100.0, 190.0, 210.0),
        }),
        ("lt8", GoalBand {
            fasting: range(90.0, 90.0, 150.0, 170.0),
            post_prandial: range(110.0, 110.0, 200.0, 220.0),
        }),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let point = |a1c: f64, glucose: f64| CurvePoint { a1c, glucose };

    let potency_table: BTreeMap<String, Potency> = [
        ("Metformin", potency(60.0, 60.0)),
        ("SGLT2", potency(25.0, 10.0)),
        ("GLP1", potency(15.0, 75.0)),
        ("DPP4", potency(5.0, 50.0)),
        ("Sulfonylurea", potency(70.0, 40.0)),
        ("TZD", potency(15.0, 65.0)),
        ("Basal Insulin", potency(100.0, 40.0)),
        ("Bolus Insulin", potency(0.0, 100.0)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let potency_on_therapy: BTreeMap<String, Potency> = [
        ("Metformin", potency(25.0, 25.0)),
        ("SGLT2", potency(10.0, 5.0)),
        ("GLP1", potency(10.0, 35.0)),
        ("DPP4", potency(0.0, 15.0)),
        ("Sulfonylurea", potency(30.0, 20.0)),
        ("TZD", potency(10.0, 25.0)),
        ("Basal Insulin", potency(50.0, 15.0)),
        ("Bolus Insulin", potency(0.0, 50.0)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    GlucoseTable {
        version: "demo-1".to_string(),
        goal_bands,
        a1c_to_fasting: vec![
            point(6.5, 120.0),
            point(7.5, 153.3),
            point(8.5, 186.7),
            point(9.7, 226.7),
        ],
        a1c_to_post_prandial: vec![
            point(6.5, 140.0),
            point(8.0, 183.0),
            point(9.5, 226.0),
            point(11.0, 269.0),
        ],
        potency: potency_table,
        potency_on_therapy,
        goal_bonus_tight: 0.05,
        goal_bonus_moderate: 0.03,
        potency_axis_bonus: 0.05,
        on_therapy_bonus: 0.05,
    }
}
