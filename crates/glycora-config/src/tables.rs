//! The three versioned rule tables.
//!
//! All tables deserialize from JSON or YAML, use `BTreeMap` for deterministic
//! iteration, and are never mutated after load.

use crate::rules::{DeltaRule, DenyRule};
use glycora_common::profile::DoseUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_version() -> String { "0".to_string() }

// ── Formulary table: classes and drugs ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CostTier {
    /// Coverage adjustment for the tier.
    pub fn coverage_delta(&self) -> f64 {
        match self {
            CostTier::Low => 0.05,
            CostTier::Medium => -0.03,
            CostTier::High => -0.07,
            CostTier::VeryHigh => -0.10,
        }
    }

    /// VA pharmacy benefit boost, scaled so expensive classes gain the most
    /// from VA coverage.
    pub fn va_pdf_boost(&self) -> f64 {
        match self {
            CostTier::Low => 0.15,
            CostTier::Medium => 0.20,
            CostTier::High => 0.25,
            CostTier::VeryHigh => 0.30,
        }
    }

    /// Ordering key for the lowest-cost selection (lower is cheaper).
    pub fn rank(&self) -> u8 {
        match self {
            CostTier::Low => 0,
            CostTier::Medium => 1,
            CostTier::High => 2,
            CostTier::VeryHigh => 3,
        }
    }
}

/// Coverage adjustment for a formulary tier (1 best, 4 worst).
pub fn formulary_tier_delta(tier: u8) -> f64 {
    match tier {
        1 => 0.02,
        2 => -0.03,
        3 => -0.08,
        _ => -0.12,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugClassDef {
    pub display_name: String,
    pub cost_tier: CostTier,
    /// Formulary tier 1–4.
    pub formulary_tier: u8,
    /// Starting coverage score before adjustments.
    pub base_access_score: f64,
    #[serde(default)]
    pub allergy_labels: Vec<String>,
    /// Listed on the VA pharmacy benefit formulary.
    #[serde(default)]
    pub va_pdf: bool,
    #[serde(default)]
    pub prior_auth: bool,
    /// Class whose titration benefits from CGM data.
    #[serde(default)]
    pub cgm_benefit: bool,
    /// Insulin or secretagogue: takes the hypoglycemia penalty when lows
    /// are documented.
    #[serde(default)]
    pub hypoglycemia_risk: bool,
    /// Rapid-acting: takes an extra penalty for post-meal lows.
    #[serde(default)]
    pub postprandial_hypo_risk: bool,
    /// Low-cost class that stays eligible under the affordability gate.
    #[serde(default)]
    pub affordable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugDef {
    pub class: String,
    pub display_name: String,
    /// Baseline clinical fitness, 0–1.
    pub clinical_base: f64,
    #[serde(default)]
    pub deny_if: Vec<DenyRule>,
    #[serde(default)]
    pub clinical_boost: Vec<DeltaRule>,
    #[serde(default)]
    pub caution_if: Vec<DeltaRule>,
    /// Bonus when the patient is already on another drug of this class.
    #[serde(default)]
    pub drug_in_class_bonus: f64,
    /// Participates in the tight-goal bonus.
    #[serde(default)]
    pub goal_band_bonus: bool,
    #[serde(default)]
    pub brand_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormularyTable {
    #[serde(default = "default_version")]
    pub version: String,
    pub classes: BTreeMap<String, DrugClassDef>,
    pub drugs: BTreeMap<String, DrugDef>,
    /// Added to clinical fit when the candidate is the patient's current drug.
    #[serde(default = "default_current_therapy_boost")]
    pub current_therapy_boost: f64,
}

fn default_current_therapy_boost() -> f64 { 0.20 }

// ── Dosing table: eGFR-banded titration ladders ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgfrBand {
    pub min_egfr: f64,
    /// Exclusive upper bound; open-ended when absent.
    #[serde(default)]
    pub max_egfr: Option<f64>,
    /// Ordered titration steps, lowest first; the last step is the maximum.
    pub steps: Vec<f64>,
}

impl EgfrBand {
    pub fn contains(&self, egfr: f64) -> bool {
        egfr >= self.min_egfr && self.max_egfr.map_or(true, |hi| egfr < hi)
    }

    pub fn max_step(&self) -> Option<f64> {
        self.steps.last().copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseLadder {
    pub unit: DoseUnit,
    /// Weekly ladders compare the per-administration amount; daily ladders
    /// compare the daily total.
    #[serde(default)]
    pub weekly: bool,
    pub bands: Vec<EgfrBand>,
}

impl DoseLadder {
    pub fn band_for(&self, egfr: f64) -> Option<&EgfrBand> {
        self.bands.iter().find(|b| b.contains(egfr))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DosingTable {
    #[serde(default = "default_version")]
    pub version: String,
    /// Intake medication-form values to class names.
    pub form_to_class: BTreeMap<String, String>,
    /// Representative drug recommended when only a class is selected.
    pub default_drug_by_class: BTreeMap<String, String>,
    /// Class-level ladders.
    pub ladders: BTreeMap<String, DoseLadder>,
    /// Drug-specific overrides; take precedence over the class ladder.
    #[serde(default)]
    pub by_drug: BTreeMap<String, DoseLadder>,
}

// ── Glucose table: goals, estimation curves, potency ─────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetRange {
    pub reduce_below: f64,
    pub ok_min: f64,
    pub ok_max: f64,
    pub increase_at: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GoalBand {
    pub fasting: TargetRange,
    pub post_prandial: TargetRange,
}

/// One point on an A1C-to-glucose estimation curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurvePoint {
    pub a1c: f64,
    pub glucose: f64,
}

/// Expected glucose-lowering magnitude of a class, 0–100 per axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Potency {
    pub fasting: f64,
    pub post_prandial: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseTable {
    #[serde(default = "default_version")]
    pub version: String,
    /// Keyed by goal tier ("lt7", "lt7_5", "lt8").
    pub goal_bands: BTreeMap<String, GoalBand>,
    /// Ordered by ascending A1C.
    pub a1c_to_fasting: Vec<CurvePoint>,
    pub a1c_to_post_prandial: Vec<CurvePoint>,
    /// Initiation potency by class.
    pub potency: BTreeMap<String, Potency>,
    /// Dose-increase potency for a class the patient is already on.
    pub potency_on_therapy: BTreeMap<String, Potency>,
    #[serde(default = "default_goal_bonus_tight")]
    pub goal_bonus_tight: f64,
    #[serde(default = "default_goal_bonus_moderate")]
    pub goal_bonus_moderate: f64,
    /// Per-axis bonus when potency can reach the target.
    #[serde(default = "default_potency_axis_bonus")]
    pub potency_axis_bonus: f64,
    /// Extra increment when evaluating a dose increase on current therapy.
    #[serde(default = "default_on_therapy_bonus")]
    pub on_therapy_bonus: f64,
}

fn default_goal_bonus_tight() -> f64 { 0.05 }
fn default_goal_bonus_moderate() -> f64 { 0.03 }
fn default_potency_axis_bonus() -> f64 { 0.05 }
fn default_on_therapy_bonus() -> f64 { 0.05 }
