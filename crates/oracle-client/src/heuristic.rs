use async_trait::async_trait;
use listing_core::{ComparableSet, EngineError, Listing, MarketOracle, OracleEstimate};
use valuation_engine::valuation::naive_per_bedroom_estimate;

/// Offline oracle: median comparable rent per bedroom times the target's
/// bedroom count. Used when no LLM endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct HeuristicOracle;

#[async_trait]
impl MarketOracle for HeuristicOracle {
    async fn estimate(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
    ) -> Result<OracleEstimate, EngineError> {
        let estimated_value = naive_per_bedroom_estimate(target, comparables)
            .ok_or_else(|| EngineError::InvalidEstimate(format!("no priced comparables for {}", target.id)))?;
        Ok(OracleEstimate {
            estimated_value: Some(estimated_value),
            ..Default::default()
        })
    }

    fn backend_name(&self) -> &'static str {
        "heuristic"
    }
}
