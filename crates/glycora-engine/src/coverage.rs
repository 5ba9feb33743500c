//! Formulary/cost-fit scoring.
//!
//! Coverage is a class-level property: base access score plus insurance,
//! cost-tier, formulary-tier, prior-auth, VA-formulary and CGM adjustments,
//! clamped to [0, 1]. Exclusion is decided by the clinical scorer; coverage
//! is never computed for an excluded drug.

use glycora_common::profile::Insurance;
use glycora_common::PatientProfile;
use glycora_config::{formulary_tier_delta, DrugClassDef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageBreakdown {
    pub base: f64,
    pub insurance_delta: f64,
    pub cost_tier_delta: f64,
    pub formulary_tier_delta: f64,
    pub prior_auth_penalty: f64,
    pub va_pdf_boost: f64,
    pub cgm_boost: f64,
    pub total: f64,
}

/// Exactly one insurance adjustment applies.
fn insurance_delta(insurance: Insurance) -> f64 {
    match insurance {
        Insurance::Va => 0.10,
        Insurance::Medicare => 0.05,
        Insurance::Medicaid => -0.05,
        Insurance::Uninsured => -0.25,
        Insurance::Private => 0.0,
    }
}

pub fn score_class(class_def: &DrugClassDef, profile: &PatientProfile) -> CoverageBreakdown {
    let base = class_def.base_access_score;
    let insurance = insurance_delta(profile.insurance);
    let cost = class_def.cost_tier.coverage_delta();
    let tier = formulary_tier_delta(class_def.formulary_tier);
    let prior_auth = if class_def.prior_auth { 0.20 } else { 0.0 };

    // The VA pharmacy benefit boost only means anything to a VA patient.
    let va_pdf = if class_def.va_pdf && profile.insurance == Insurance::Va {
        class_def.cost_tier.va_pdf_boost()
    } else {
        0.0
    };

    let cgm = if class_def.cgm_benefit && profile.uses_cgm { 0.02 } else { 0.0 };

    let total = (base + insurance + cost + tier - prior_auth + va_pdf + cgm).clamp(0.0, 1.0);

    CoverageBreakdown {
        base,
        insurance_delta: insurance,
        cost_tier_delta: cost,
        formulary_tier_delta: tier,
        prior_auth_penalty: prior_auth,
        va_pdf_boost: va_pdf,
        cgm_boost: cgm,
        total,
    }
}
