//! Neighborhood batch runner.
//!
//! Per neighborhood: fetch the complete active snapshot, reconcile it with
//! the listing cache, evaluate only what changed, then persist results and
//! publish or retract opportunities. Neighborhoods run one at a time; within
//! one, oracle calls are bounded by a semaphore and spaced by a politeness
//! delay.

use chrono::Utc;
use listing_cache::{CacheDiff, ChangeKind, ListingCache};
use listing_core::{
    BuildingRegistry, CacheEntry, EngineError, Listing, ListingSource, MarketOracle, Opportunity,
    Pagination, RegistryRecord, Store,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use valuation_engine::{EngineConfig, ValuationEngine};

pub mod files;
pub mod stats;

pub use files::{JsonDirListingSource, JsonFileRegistry};
pub use stats::RunStats;

/// Oracle-reported discounts further than this from the local figure are logged
const DISCOUNT_DISAGREEMENT_POINTS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub neighborhoods: Vec<String>,
    pub page_size: u32,
    /// A source still returning full pages after this many is treated as
    /// failed rather than trusted as complete
    pub max_pages: u32,
    /// Pause after every oracle call
    pub inter_call_delay: Duration,
    pub max_concurrent_oracle_calls: usize,
    /// Ask the oracle for prose reasoning on undervalued listings
    pub reasoning_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            neighborhoods: Vec::new(),
            page_size: 100,
            max_pages: 200,
            inter_call_delay: Duration::from_millis(500),
            max_concurrent_oracle_calls: 1,
            reasoning_enabled: true,
        }
    }
}

/// Shared state for the evaluation tasks of one neighborhood
struct NeighborhoodRun {
    engine: Arc<ValuationEngine>,
    oracle: Arc<dyn MarketOracle>,
    cache: Arc<ListingCache>,
    pool: Vec<Listing>,
    active_count: usize,
    permits: Arc<Semaphore>,
    inter_call_delay: Duration,
    reasoning_enabled: bool,
}

#[derive(Debug, Default)]
struct ListingOutcome {
    oracle_calls: usize,
    oracle_failed: bool,
    no_comparables: bool,
    undervalued: bool,
    published: bool,
    retracted: bool,
    reasoning: bool,
}

impl NeighborhoodRun {
    async fn call_oracle<T, F>(&self, call: F) -> Result<T, EngineError>
    where
        F: std::future::Future<Output = Result<T, EngineError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EngineError::OracleUnavailable(e.to_string()))?;
        let outcome = call.await;
        if !self.inter_call_delay.is_zero() {
            tokio::time::sleep(self.inter_call_delay).await;
        }
        outcome
    }

    async fn evaluate(&self, listing: Listing, entry: CacheEntry) -> Result<ListingOutcome, EngineError> {
        let mut outcome = ListingOutcome::default();
        let comparables = self.engine.select_comparables(&listing, &self.pool);

        let estimate = if comparables.is_empty() {
            outcome.no_comparables = true;
            Err(EngineError::NoComparables(listing.id.clone()))
        } else {
            outcome.oracle_calls += 1;
            self.call_oracle(self.oracle.estimate(&listing, &comparables))
                .await
                .and_then(|estimate| estimate.validate(&listing.id))
        };
        outcome.oracle_failed = estimate.as_ref().is_err_and(|e| !matches!(e, EngineError::NoComparables(_)));

        let now = Utc::now();
        let mut result = self
            .engine
            .assess(&listing, &comparables, &estimate, self.active_count, now);

        if let (Ok(reported), Some(_)) = (&estimate, result.estimated_market_value) {
            if let Some(reported_discount) = reported.reported_discount_percent {
                if (reported_discount - result.discount_percent).abs() > DISCOUNT_DISAGREEMENT_POINTS {
                    tracing::debug!(
                        "Oracle discount {:.1}% for {} disagrees with computed {:.1}%, using computed",
                        reported_discount,
                        listing.id,
                        result.discount_percent
                    );
                }
            }
        }

        if result.is_opportunity() {
            outcome.undervalued = true;
            if self.reasoning_enabled {
                outcome.oracle_calls += 1;
                match self
                    .call_oracle(self.oracle.explain(&listing, &comparables, &result))
                    .await
                {
                    Ok(text) => {
                        result.reasoning = Some(text);
                        outcome.reasoning = true;
                    }
                    Err(e) => tracing::debug!("No reasoning for {}: {}", listing.id, e),
                }
            }
        }

        let store = self.cache.store();
        store.upsert_result(&result).await?;

        match Opportunity::from_result(&listing, &result) {
            Some(opportunity) => {
                store.upsert_opportunity(&opportunity).await?;
                outcome.published = true;
                tracing::info!(
                    "Opportunity: {} at {} (${:.0}, {:.1}% below market, confidence {})",
                    listing.id,
                    listing.address,
                    listing.price,
                    result.discount_percent,
                    result.confidence
                );
            }
            None => {
                outcome.retracted = self.cache.retract_opportunity(&listing.id, now).await?;
            }
        }

        if outcome.oracle_failed {
            self.cache.mark_failed(&entry, now).await?;
        } else {
            self.cache.mark_analyzed(&entry, now).await?;
        }

        Ok(outcome)
    }
}

pub struct ValuationOrchestrator {
    source: Arc<dyn ListingSource>,
    oracle: Arc<dyn MarketOracle>,
    registry: Arc<dyn BuildingRegistry>,
    cache: Arc<ListingCache>,
    engine_config: EngineConfig,
    config: OrchestratorConfig,
}

impl ValuationOrchestrator {
    pub fn new(
        source: Arc<dyn ListingSource>,
        oracle: Arc<dyn MarketOracle>,
        registry: Arc<dyn BuildingRegistry>,
        cache: Arc<ListingCache>,
        engine_config: EngineConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            source,
            oracle,
            registry,
            cache,
            engine_config,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Load the registry once. Failure is not fatal: stabilization estimates
    /// fall back to their capped floor for the whole run.
    async fn load_registry(&self) -> Option<Vec<RegistryRecord>> {
        match self.registry.lookup().await {
            Ok(records) => Some(records),
            Err(e) => {
                tracing::warn!("Building registry unavailable, stabilization estimates capped: {}", e);
                None
            }
        }
    }

    fn engine(&self, registry: Option<Vec<RegistryRecord>>) -> Arc<ValuationEngine> {
        Arc::new(ValuationEngine::new(self.engine_config.clone(), registry))
    }

    /// Fetch every page of the neighborhood's active listings. Any failure
    /// fails the whole snapshot so a partial one is never reconciled.
    async fn fetch_snapshot(&self, neighborhood: &str) -> Result<Vec<Listing>, EngineError> {
        let mut snapshot = Vec::new();
        let mut pagination = Pagination::first(self.config.page_size.max(1));

        loop {
            if pagination.page >= self.config.max_pages {
                return Err(EngineError::SourceUnavailable(format!(
                    "{}: still returning full pages after {} pages",
                    neighborhood, self.config.max_pages
                )));
            }
            let page = self.source.fetch_active(neighborhood, pagination).await?;
            let last = page.len() < pagination.page_size as usize;
            snapshot.extend(page);
            if last {
                break;
            }
            pagination = pagination.next();
        }

        tracing::debug!(
            "{}: fetched {} listings in {} page(s)",
            neighborhood,
            snapshot.len(),
            pagination.page + 1
        );
        Ok(snapshot)
    }

    /// Run every configured neighborhood, one at a time. Neighborhood
    /// failures are logged and counted, never propagated.
    pub async fn run_batch(&self) -> RunStats {
        let mut stats = RunStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        tracing::info!(
            "Starting valuation run over {} neighborhoods (oracle: {})",
            self.config.neighborhoods.len(),
            self.oracle.backend_name()
        );

        let engine = self.engine(self.load_registry().await);

        for neighborhood in &self.config.neighborhoods {
            match self.process_neighborhood(&engine, neighborhood).await {
                Ok(neighborhood_stats) => stats.merge(&neighborhood_stats),
                Err(e) => {
                    tracing::warn!("Skipping neighborhood {}: {}", neighborhood, e);
                    stats.neighborhoods_failed += 1;
                }
            }
        }

        stats.finished_at = Some(Utc::now());
        tracing::info!("Valuation run complete: {}", stats.summary());
        stats
    }

    /// Run a single neighborhood with a freshly loaded registry.
    pub async fn run_neighborhood(&self, neighborhood: &str) -> Result<RunStats, EngineError> {
        let engine = self.engine(self.load_registry().await);
        self.process_neighborhood(&engine, neighborhood).await
    }

    async fn process_neighborhood(
        &self,
        engine: &Arc<ValuationEngine>,
        neighborhood: &str,
    ) -> Result<RunStats, EngineError> {
        let snapshot = self.fetch_snapshot(neighborhood).await?;
        let diff = self.cache.reconcile(neighborhood, snapshot, Utc::now()).await?;

        let mut stats = Self::diff_stats(&diff);
        stats.neighborhoods_processed = 1;

        let run = Arc::new(NeighborhoodRun {
            engine: Arc::clone(engine),
            oracle: Arc::clone(&self.oracle),
            cache: Arc::clone(&self.cache),
            pool: diff.snapshot.clone(),
            active_count: diff.snapshot.len(),
            permits: Arc::new(Semaphore::new(self.config.max_concurrent_oracle_calls.max(1))),
            inter_call_delay: self.config.inter_call_delay,
            reasoning_enabled: self.config.reasoning_enabled,
        });

        let mut tasks = JoinSet::new();
        for listing in diff.to_analyze() {
            let Some(entry) = diff.entry(&listing.id).cloned() else {
                continue;
            };
            let run = Arc::clone(&run);
            let listing = listing.clone();
            tasks.spawn(async move {
                let id = listing.id.clone();
                (id, run.evaluate(listing, entry).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    stats.analyzed += 1;
                    stats.oracle_calls += outcome.oracle_calls;
                    stats.oracle_failures += outcome.oracle_failed as usize;
                    stats.no_comparables += outcome.no_comparables as usize;
                    stats.undervalued += outcome.undervalued as usize;
                    stats.opportunities_published += outcome.published as usize;
                    stats.opportunities_retracted += outcome.retracted as usize;
                    stats.reasoning_generated += outcome.reasoning as usize;
                }
                Ok((id, Err(e))) => {
                    tracing::warn!("Failed to record evaluation of {}: {}", id, e);
                    stats.listing_errors += 1;
                }
                Err(e) => {
                    tracing::error!("Evaluation task error: {}", e);
                    stats.listing_errors += 1;
                }
            }
        }

        tracing::info!(
            "{}: analyzed {}, {} undervalued, {} oracle failures",
            neighborhood,
            stats.analyzed,
            stats.undervalued,
            stats.oracle_failures
        );
        Ok(stats)
    }

    fn diff_stats(diff: &CacheDiff) -> RunStats {
        let mut stats = RunStats {
            listings_seen: diff.snapshot.len(),
            vacated: diff.vacated().len(),
            opportunities_retracted: diff.retracted,
            ..Default::default()
        };
        for change in &diff.changes {
            match change.kind {
                ChangeKind::New => stats.new_listings += 1,
                ChangeKind::PriceChanged { .. } => stats.price_changes += 1,
                ChangeKind::Relisted => stats.relisted += 1,
                ChangeKind::Stale => stats.stale += 1,
                ChangeKind::Unchanged | ChangeKind::Vacated | ChangeKind::Missing => {}
            }
        }
        stats
    }
}
