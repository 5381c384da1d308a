use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AnalysisResult, CacheEntry, CacheFilter, ComparableSet, EngineError, Listing, OracleEstimate,
    Opportunity, Pagination, RegistryRecord,
};

/// Paginated feed of active listings for a neighborhood
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page. A page shorter than `pagination.page_size` ends the snapshot.
    async fn fetch_active(
        &self,
        neighborhood: &str,
        pagination: Pagination,
    ) -> Result<Vec<Listing>, EngineError>;
}

/// External market-estimate provider. Fallible and non-deterministic.
#[async_trait]
pub trait MarketOracle: Send + Sync {
    async fn estimate(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
    ) -> Result<OracleEstimate, EngineError>;

    /// Prose explanation for a confirmed opportunity. Only requested for
    /// undervalued results.
    async fn explain(
        &self,
        _target: &Listing,
        _comparables: &ComparableSet,
        _result: &AnalysisResult,
    ) -> Result<String, EngineError> {
        Err(EngineError::OracleUnavailable(
            "detailed reasoning not supported".into(),
        ))
    }

    fn backend_name(&self) -> &'static str;
}

/// Rent-regulation reference data, loaded once per run
#[async_trait]
pub trait BuildingRegistry: Send + Sync {
    async fn lookup(&self) -> Result<Vec<RegistryRecord>, EngineError>;
}

/// Persistence collaborator. Every write is an upsert keyed by listing id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), EngineError>;

    async fn upsert_result(&self, result: &AnalysisResult) -> Result<(), EngineError>;

    /// Mark the stored result for a listing as no longer current.
    async fn invalidate_result(
        &self,
        listing_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    async fn upsert_opportunity(&self, opportunity: &Opportunity) -> Result<(), EngineError>;

    async fn query_by_neighborhood(
        &self,
        neighborhood: &str,
        filter: CacheFilter,
    ) -> Result<Vec<CacheEntry>, EngineError>;

    /// Latest result that has not been invalidated
    async fn latest_result(&self, listing_id: &str) -> Result<Option<AnalysisResult>, EngineError>;

    async fn opportunity(&self, listing_id: &str) -> Result<Option<Opportunity>, EngineError>;
}
