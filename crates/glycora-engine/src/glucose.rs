//! Glucose estimation, goal-band targets, and the potency boost.

use glycora_common::PatientProfile;
use glycora_config::{ConfigStore, CurvePoint, GoalBand, Potency};

/// Interpolate a glucose estimate from an A1C value along a configured curve.
/// Values outside the curve clamp to its ends. The curve is validated at load
/// to be non-empty and strictly ascending in A1C.
pub fn estimate_from_a1c(a1c: f64, curve: &[CurvePoint]) -> Option<f64> {
    let first = curve.first()?;
    let last = curve.last()?;
    if a1c <= first.a1c {
        return Some(first.glucose);
    }
    if a1c >= last.a1c {
        return Some(last.glucose);
    }
    for pair in curve.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if a1c >= lo.a1c && a1c <= hi.a1c {
            let t = (a1c - lo.a1c) / (hi.a1c - lo.a1c);
            return Some(lo.glucose + t * (hi.glucose - lo.glucose));
        }
    }
    None
}

/// Goal band for the profile's A1C-goal tier. Presence of all three tiers is
/// guaranteed by store validation.
pub fn goal_band<'a>(store: &'a ConfigStore, profile: &PatientProfile) -> Option<&'a GoalBand> {
    store.glucose.goal_bands.get(profile.goal_tier.as_str())
}

/// Targets used for "above goal" comparisons: the upper bound of the OK range.
pub fn band_targets(band: &GoalBand) -> (f64, f64) {
    (band.fasting.ok_max, band.post_prandial.ok_max)
}

/// Potency boost for a candidate drug's class: up to one axis bonus each for
/// fasting and post-prandial, granted when the class's expected lowering
/// would leave the patient's average at or under the band target — an
/// average already at goal qualifies. Being on the drug itself switches to
/// the on-therapy (dose-increase) potency and adds a flat on-therapy
/// increment regardless of the axes.
pub fn potency_boost(
    store: &ConfigStore,
    profile: &PatientProfile,
    class: &str,
    on_drug: bool,
) -> f64 {
    let table = &store.glucose;
    let mut boost = if on_drug { table.on_therapy_bonus } else { 0.0 };

    let Some(band) = goal_band(store, profile) else {
        return boost;
    };
    let potency: Option<&Potency> = if on_drug {
        table.potency_on_therapy.get(class).or_else(|| table.potency.get(class))
    } else {
        table.potency.get(class)
    };
    let Some(potency) = potency else {
        return boost;
    };

    let (fasting_target, post_prandial_target) = band_targets(band);

    if let Some(avg) = profile.glucose.fasting_avg {
        if avg - potency.fasting <= fasting_target {
            boost += table.potency_axis_bonus;
        }
    }
    if let Some(avg) = profile.glucose.post_prandial_avg {
        if avg - potency.post_prandial <= post_prandial_target {
            boost += table.potency_axis_bonus;
        }
    }
    boost
}
