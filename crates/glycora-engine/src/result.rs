//! Recommendation output types.

use crate::clinical::ClinicalBreakdown;
use crate::coverage::CoverageBreakdown;
use glycora_common::profile::DoseUnit;
use serde::{Deserialize, Serialize};

/// One ranked, non-excluded candidate with its full score decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDrug {
    pub drug_id: String,
    pub display_name: String,
    pub class: String,
    pub class_display: String,
    pub clinical_fit: f64,
    pub coverage: f64,
    pub clinical_detail: ClinicalBreakdown,
    pub coverage_detail: Option<CoverageBreakdown>,
    /// True only for the synthetic continue-current-regimen entry.
    pub no_change: bool,
}

/// A drug removed from the pool, with the rule reason for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub drug_id: String,
    pub reason: String,
}

/// Dose instruction attached to a pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DoseOutcome {
    /// Not currently on the drug: start at the band's first step.
    Start { dose: String },
    /// On the drug below the ladder top: advance one step.
    Increase { dose: String },
    /// On the drug at the final step for this eGFR band.
    AtMaximum,
    /// "No Change": keep every current medication at its current dose.
    Continue,
    /// Dose could not be resolved; the reason is surfaced, never guessed.
    Unresolved { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickRole {
    Primary,
    Alternate,
    LowestCost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub role: PickRole,
    pub drug: ScoredDrug,
    pub dose: DoseOutcome,
}

// ── De-escalation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeescalationTrigger {
    FastingLows,
    PostPrandialLows,
    UntimedLows,
    HighPotencyInitiation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DoseAction {
    Stop,
    Reduce { new_amount: f64, unit: DoseUnit },
}

impl DoseAction {
    /// Ordering used to reconcile conflicting chain actions on one drug:
    /// stopping beats any reduction; a deeper reduction beats a shallower one.
    pub fn more_conservative_than(&self, other: &DoseAction) -> bool {
        match (self, other) {
            (DoseAction::Stop, DoseAction::Stop) => false,
            (DoseAction::Stop, DoseAction::Reduce { .. }) => true,
            (DoseAction::Reduce { .. }, DoseAction::Stop) => false,
            (DoseAction::Reduce { new_amount: a, .. }, DoseAction::Reduce { new_amount: b, .. }) => {
                a < b
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeescalationAction {
    /// Drug id when resolved, otherwise the raw medication name.
    pub drug: String,
    pub display_name: String,
    pub action: DoseAction,
    pub trigger: DeescalationTrigger,
}

// ── Result envelope ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigVersions {
    pub formulary: String,
    pub dosing: String,
    pub glucose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// Canonical audit order: descending (clinical_fit, coverage).
    pub ranked: Vec<ScoredDrug>,
    pub excluded: Vec<Exclusion>,
    /// 1–3 entries: primary, alternate from a distinct class, lowest-cost.
    pub picks: Vec<Pick>,
    pub deescalation: Vec<DeescalationAction>,
    /// Advisory notices (renal warnings, unresolved doses).
    pub warnings: Vec<String>,
    pub config_versions: ConfigVersions,
}
