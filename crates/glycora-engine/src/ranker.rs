//! Candidate ranking and pick selection.

use crate::result::ScoredDrug;
use glycora_common::{GlycoraError, Result};
use glycora_config::ConfigStore;
use std::cmp::Ordering;

/// Canonical audit order: descending clinical fit, then descending coverage,
/// then ascending drug id. The final key makes exact ties deterministic
/// regardless of map iteration or input order.
pub fn rank(mut pool: Vec<ScoredDrug>) -> Vec<ScoredDrug> {
    pool.sort_by(|a, b| {
        b.clinical_fit
            .total_cmp(&a.clinical_fit)
            .then(b.coverage.total_cmp(&a.coverage))
            .then_with(|| a.drug_id.cmp(&b.drug_id))
    });
    pool
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub primary: ScoredDrug,
    pub alternate: Option<ScoredDrug>,
    pub lowest_cost: Option<ScoredDrug>,
}

/// Select picks from an already-ranked pool.
///
/// Primary is the head. Alternate is the highest-ranked entry from a
/// different class, omitted when the pool spans one class. Lowest-cost comes
/// from the top five by fit, excluding "No Change" and anything already
/// picked, preferring entries with workable coverage.
pub fn select(ranked: &[ScoredDrug], store: &ConfigStore) -> Result<Selection> {
    let primary = ranked.first().cloned().ok_or(GlycoraError::NoEligibleDrug)?;

    let alternate = ranked
        .iter()
        .find(|d| d.class != primary.class && !d.no_change)
        .cloned();

    let lowest_cost = lowest_cost_pick(ranked, &primary, alternate.as_ref(), store);

    Ok(Selection { primary, alternate, lowest_cost })
}

fn lowest_cost_pick(
    ranked: &[ScoredDrug],
    primary: &ScoredDrug,
    alternate: Option<&ScoredDrug>,
    store: &ConfigStore,
) -> Option<ScoredDrug> {
    let candidates: Vec<&ScoredDrug> = ranked
        .iter()
        .filter(|d| !d.no_change)
        .take(5)
        .filter(|d| {
            d.drug_id != primary.drug_id
                && alternate.map_or(true, |a| d.drug_id != a.drug_id)
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }

    // Entries the insurance will plausibly cover come first; fall back to the
    // whole pool only when nothing clears the bar.
    let viable: Vec<&ScoredDrug> = candidates
        .iter()
        .copied()
        .filter(|d| d.coverage > 0.5)
        .collect();
    let pool = if viable.is_empty() { candidates } else { viable };

    pool.into_iter()
        .min_by(|a, b| cost_order(a, b, store))
        .cloned()
}

fn cost_order(a: &ScoredDrug, b: &ScoredDrug, store: &ConfigStore) -> Ordering {
    let key = |d: &ScoredDrug| {
        store
            .class(&d.class)
            .map(|c| (c.cost_tier.rank(), c.formulary_tier))
            .unwrap_or((u8::MAX, u8::MAX))
    };
    key(a).cmp(&key(b)).then_with(|| a.drug_id.cmp(&b.drug_id))
}
