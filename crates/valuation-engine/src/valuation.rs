//! Discount / premium calculation.
//!
//! The discount is always recomputed from the actual price and the oracle's
//! estimated value; any figure the oracle reports itself is ignored.

use listing_core::{ComparableSet, Listing, PriceClass};

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub estimated_market_value: Option<f64>,
    /// (estimate - actual) / estimate * 100. Positive means under market.
    pub discount_percent: f64,
    /// How much below the estimate the listing is priced, never negative
    pub savings: f64,
    /// Direction only; see [`Valuation::classify`] for the threshold-gated call
    pub classification: PriceClass,
    /// False when the estimate was missing or unusable
    pub has_signal: bool,
}

impl Valuation {
    fn no_signal() -> Self {
        Self {
            estimated_market_value: None,
            discount_percent: 0.0,
            savings: 0.0,
            classification: PriceClass::Fair,
            has_signal: false,
        }
    }

    /// Overvalued whenever the discount is negative, undervalued only once
    /// the discount reaches `threshold_percent`, fair otherwise.
    pub fn classify(&self, threshold_percent: f64) -> PriceClass {
        if !self.has_signal {
            return PriceClass::Fair;
        }
        if self.discount_percent < 0.0 {
            PriceClass::Overvalued
        } else if self.discount_percent >= threshold_percent {
            PriceClass::Undervalued
        } else {
            PriceClass::Fair
        }
    }

    /// Whether detailed (paid) reasoning is worth requesting for this listing
    pub fn warrants_reasoning(&self) -> bool {
        self.has_signal && self.classification != PriceClass::Overvalued
    }
}

/// Fails closed: a missing, non-finite or non-positive estimate (or a
/// non-positive asking price) yields a no-signal valuation instead of an error.
pub fn evaluate(actual_price: f64, estimate: Option<f64>) -> Valuation {
    let estimate = match estimate {
        Some(e) if e.is_finite() && e > 0.0 => e,
        _ => return Valuation::no_signal(),
    };
    if !actual_price.is_finite() || actual_price <= 0.0 {
        return Valuation::no_signal();
    }

    let discount_percent = (estimate - actual_price) / estimate * 100.0;
    let classification = if discount_percent > 0.0 {
        PriceClass::Undervalued
    } else if discount_percent < 0.0 {
        PriceClass::Overvalued
    } else {
        PriceClass::Fair
    };

    Valuation {
        estimated_market_value: Some(estimate),
        discount_percent,
        savings: (estimate - actual_price).max(0.0),
        classification,
        has_signal: true,
    }
}

/// Median of a data slice, `None` when empty.
pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Naive market estimate: median comparable price per bedroom times the
/// target's bedroom count (studios count as one bedroom).
pub fn naive_per_bedroom_estimate(target: &Listing, comparables: &ComparableSet) -> Option<f64> {
    let per_bedroom: Vec<f64> = comparables
        .comparables
        .iter()
        .filter(|c| c.price > 0.0)
        .map(|c| c.price_per_bedroom())
        .collect();
    median(&per_bedroom).map(|m| m * target.bedrooms.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_discount_under_market() {
        let v = evaluate(3000.0, Some(4000.0));
        assert!(v.has_signal);
        assert_relative_eq!(v.discount_percent, 25.0);
        assert_relative_eq!(v.savings, 1000.0);
        assert_eq!(v.classification, PriceClass::Undervalued);
    }

    #[test]
    fn test_negative_discount_is_overvalued() {
        let v = evaluate(5000.0, Some(4000.0));
        assert_relative_eq!(v.discount_percent, -25.0);
        assert_eq!(v.savings, 0.0);
        assert_eq!(v.classification, PriceClass::Overvalued);
        assert_eq!(v.classify(15.0), PriceClass::Overvalued);
        assert!(!v.warrants_reasoning());
    }

    #[test]
    fn test_sign_always_agrees_with_price_order() {
        let prices = [500.0, 1999.99, 2000.0, 2000.01, 3250.0, 9_000_000.0];
        for &actual in &prices {
            for &estimate in &prices {
                let v = evaluate(actual, Some(estimate));
                if actual < estimate {
                    assert!(v.discount_percent > 0.0, "{actual} vs {estimate}");
                } else if actual > estimate {
                    assert!(v.discount_percent < 0.0, "{actual} vs {estimate}");
                } else {
                    assert_eq!(v.discount_percent, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_fails_closed_on_bad_estimate() {
        for estimate in [None, Some(0.0), Some(-4000.0), Some(f64::NAN), Some(f64::INFINITY)] {
            let v = evaluate(3000.0, estimate);
            assert!(!v.has_signal);
            assert_eq!(v.classification, PriceClass::Fair);
            assert_eq!(v.classify(0.0), PriceClass::Fair);
        }
        assert!(!evaluate(0.0, Some(4000.0)).has_signal);
    }

    #[test]
    fn test_threshold_gated_classification() {
        let v = evaluate(3600.0, Some(4000.0));
        assert_relative_eq!(v.discount_percent, 10.0);
        assert_eq!(v.classify(15.0), PriceClass::Fair);
        assert_eq!(v.classify(10.0), PriceClass::Undervalued);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }
}
