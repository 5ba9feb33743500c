//! Free-text dose parsing ("1000 mg BID", "12 units daily", "1 mg weekly").

use glycora_common::profile::{DoseFrequency, DoseUnit, ParsedDose};
use regex::Regex;
use std::sync::OnceLock;

fn dose_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+(?:\.\d+)?)\s*(mg|mcg|units?|u)\b(?:.*?\b(bid|tid|qd|daily|weekly|qw))?",
        )
        .unwrap_or_else(|e| panic!("dose regex is invalid: {e}"))
    })
}

/// Parse a dose string; `None` when no dose pattern is present.
pub fn parse_dose(text: &str) -> Option<ParsedDose> {
    let caps = dose_regex().captures(text)?;
    let mut amount: f64 = caps.get(1)?.as_str().parse().ok()?;

    let unit = match caps.get(2)?.as_str().to_lowercase().as_str() {
        "mg" => DoseUnit::Mg,
        "mcg" => {
            amount /= 1000.0;
            DoseUnit::Mg
        }
        _ => DoseUnit::Units,
    };

    let frequency = match caps.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(f) if f == "bid" => DoseFrequency::Bid,
        Some(f) if f == "tid" => DoseFrequency::Tid,
        Some(f) if f == "weekly" || f == "qw" => DoseFrequency::Weekly,
        _ => DoseFrequency::Daily,
    };

    Some(ParsedDose { amount, unit, frequency })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_mg() {
        let dose = parse_dose("1000 mg daily").unwrap();
        assert_eq!(dose.amount, 1000.0);
        assert_eq!(dose.unit, DoseUnit::Mg);
        assert_eq!(dose.per_day(), 1000.0);
    }

    #[test]
    fn test_bid_doubles_daily_total() {
        let dose = parse_dose("500mg BID").unwrap();
        assert_eq!(dose.frequency, DoseFrequency::Bid);
        assert_eq!(dose.per_day(), 1000.0);
    }

    #[test]
    fn test_insulin_units() {
        let dose = parse_dose("12 units at bedtime").unwrap();
        assert_eq!(dose.unit, DoseUnit::Units);
        assert_eq!(dose.amount, 12.0);

        let short = parse_dose("8 u daily").unwrap();
        assert_eq!(short.unit, DoseUnit::Units);
    }

    #[test]
    fn test_weekly_glp1() {
        let dose = parse_dose("0.5 mg weekly").unwrap();
        assert_eq!(dose.frequency, DoseFrequency::Weekly);
        assert_eq!(dose.ladder_amount(true), 0.5);
    }

    #[test]
    fn test_mcg_converted_to_mg() {
        let dose = parse_dose("750 mcg daily").unwrap();
        assert_eq!(dose.unit, DoseUnit::Mg);
        assert!((dose.amount - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_no_dose_present() {
        assert!(parse_dose("as directed").is_none());
        assert!(parse_dose("").is_none());
    }
}
