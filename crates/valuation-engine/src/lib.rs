//! Valuation Engine
//!
//! Pure, single-threaded decision logic: comparable selection, discount
//! calculation, confidence scoring, stabilization estimation and the
//! inventory-aware acceptance threshold. Nothing here performs I/O, so a
//! `ValuationEngine` can be shared across tasks evaluating distinct listings.

pub mod address;
pub mod comparables;
pub mod confidence;
pub mod stabilization;
pub mod threshold;
pub mod valuation;

pub use address::{AddressMatcher, NormalizedAddress, RegistryMatch, HOUSE_NUMBER_MISMATCH};
pub use comparables::ComparableSelector;
pub use stabilization::{StabilizationConfig, StabilizationContext, StabilizationEstimator};
pub use threshold::ThresholdPolicy;
pub use valuation::Valuation;

use chrono::{DateTime, Utc};
use listing_core::{
    AnalysisResult, ComparableSet, EngineError, Listing, OracleEstimate, OracleHints,
    RegistryRecord,
};
use serde::{Deserialize, Serialize};

/// Tunable knobs for the decision logic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_threshold_percent: f64,
    pub low_inventory_threshold_percent: f64,
    pub inventory_breakpoint: usize,
    pub registry_match_threshold: f64,
    pub rent_level_ratio: f64,
    pub min_amenity_overlap: f64,
    pub bath_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_threshold_percent: 15.0,
            low_inventory_threshold_percent: 10.0,
            inventory_breakpoint: 200,
            registry_match_threshold: 0.6,
            rent_level_ratio: 0.85,
            min_amenity_overlap: 0.5,
            bath_tolerance: 0.5,
        }
    }
}

pub struct ValuationEngine {
    selector: ComparableSelector,
    stabilization: StabilizationEstimator,
    threshold: ThresholdPolicy,
}

impl ValuationEngine {
    /// `registry` is `None` when the registry could not be loaded; the
    /// stabilization estimate then stays at its conservative floor.
    pub fn new(config: EngineConfig, registry: Option<Vec<RegistryRecord>>) -> Self {
        Self {
            selector: ComparableSelector::new(config.min_amenity_overlap, config.bath_tolerance),
            stabilization: StabilizationEstimator::new(
                registry,
                StabilizationConfig {
                    match_threshold: config.registry_match_threshold,
                    rent_level_ratio: config.rent_level_ratio,
                },
            ),
            threshold: ThresholdPolicy::new(
                config.base_threshold_percent,
                config.low_inventory_threshold_percent,
                config.inventory_breakpoint,
            ),
        }
    }

    pub fn registry_available(&self) -> bool {
        self.stabilization.registry_available()
    }

    pub fn select_comparables(&self, target: &Listing, pool: &[Listing]) -> ComparableSet {
        self.selector.select(target, pool)
    }

    pub fn threshold_for(&self, active_count: usize) -> f64 {
        self.threshold.threshold_for(active_count)
    }

    /// Combine an oracle outcome with the local checks into one result.
    ///
    /// Oracle errors, unusable estimates and an empty comparable set all
    /// produce a zero-confidence, `fair` result with `failure` set; this
    /// never returns an error.
    pub fn assess(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
        oracle: &Result<OracleEstimate, EngineError>,
        active_count: usize,
        now: DateTime<Utc>,
    ) -> AnalysisResult {
        let heuristic_estimate = valuation::naive_per_bedroom_estimate(target, comparables);
        let hints: Option<&OracleHints> = oracle.as_ref().ok().map(|e| &e.hints);

        let (estimate, mut failure) = if comparables.is_empty() {
            (None, Some(EngineError::NoComparables(target.id.clone()).to_string()))
        } else {
            match oracle {
                Ok(e) => (e.estimated_value, None),
                Err(e) => (None, Some(e.to_string())),
            }
        };

        let valuation = valuation::evaluate(target.price, estimate);
        if !valuation.has_signal && failure.is_none() {
            failure = Some(
                EngineError::InvalidEstimate(format!("{:?} for listing {}", estimate, target.id))
                    .to_string(),
            );
        }

        let threshold_percent = self.threshold_for(active_count);
        let confidence = if valuation.has_signal {
            confidence::score(comparables.tier, comparables.len())
        } else {
            0
        };
        let classification = valuation.classify(threshold_percent);
        let is_undervalued = valuation.has_signal && valuation.discount_percent >= threshold_percent;

        let stabilization = self.stabilization.estimate(
            target,
            &StabilizationContext {
                naive_estimate: heuristic_estimate,
                hints,
            },
        );

        let summary = match (&failure, valuation.estimated_market_value) {
            (None, Some(estimate)) => format!(
                "{}: ${:.0} vs estimated ${:.0} ({:+.1}%), {} comparables ({}), confidence {}. {}",
                classification.to_label(),
                target.price,
                estimate,
                valuation.discount_percent,
                comparables.len(),
                comparables.tier.label(),
                confidence,
                stabilization.explanation()
            ),
            _ => format!(
                "No pricing signal: {}. {}",
                failure.as_deref().unwrap_or("no estimate"),
                stabilization.explanation()
            ),
        };

        AnalysisResult {
            listing_id: target.id.clone(),
            neighborhood: target.neighborhood.clone(),
            evaluated_at: now,
            actual_price: target.price,
            estimated_market_value: valuation.estimated_market_value,
            discount_percent: valuation.discount_percent,
            savings: valuation.savings,
            classification,
            confidence,
            match_tier: comparables.tier,
            sample_size: comparables.len(),
            threshold_percent,
            is_undervalued,
            stabilization,
            heuristic_estimate,
            summary,
            reasoning: None,
            failure,
        }
    }
}
