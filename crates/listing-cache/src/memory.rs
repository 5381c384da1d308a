use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use listing_core::{
    AnalysisResult, CacheEntry, CacheFilter, EngineError, Opportunity, Store,
};

struct StoredResult {
    result: AnalysisResult,
    invalidated_at: Option<DateTime<Utc>>,
}

/// Process-local store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    results: DashMap<String, StoredResult>,
    opportunities: DashMap<String, Opportunity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published and retracted opportunities, ordered by listing id
    pub fn opportunities(&self) -> Vec<Opportunity> {
        let mut all: Vec<Opportunity> = self.opportunities.iter().map(|o| o.value().clone()).collect();
        all.sort_by(|a, b| a.listing_id.cmp(&b.listing_id));
        all
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), EngineError> {
        self.entries.insert(entry.listing_id.clone(), entry.clone());
        Ok(())
    }

    async fn upsert_result(&self, result: &AnalysisResult) -> Result<(), EngineError> {
        self.results.insert(
            result.listing_id.clone(),
            StoredResult {
                result: result.clone(),
                invalidated_at: None,
            },
        );
        Ok(())
    }

    async fn invalidate_result(
        &self,
        listing_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if let Some(mut stored) = self.results.get_mut(listing_id) {
            stored.invalidated_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn upsert_opportunity(&self, opportunity: &Opportunity) -> Result<(), EngineError> {
        self.opportunities
            .insert(opportunity.listing_id.clone(), opportunity.clone());
        Ok(())
    }

    async fn query_by_neighborhood(
        &self,
        neighborhood: &str,
        filter: CacheFilter,
    ) -> Result<Vec<CacheEntry>, EngineError> {
        let mut found: Vec<CacheEntry> = self
            .entries
            .iter()
            .filter(|e| e.neighborhood == neighborhood && filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.listing_id.cmp(&b.listing_id));
        Ok(found)
    }

    async fn latest_result(&self, listing_id: &str) -> Result<Option<AnalysisResult>, EngineError> {
        Ok(self
            .results
            .get(listing_id)
            .filter(|stored| stored.invalidated_at.is_none())
            .map(|stored| stored.result.clone()))
    }

    async fn opportunity(&self, listing_id: &str) -> Result<Option<Opportunity>, EngineError> {
        Ok(self.opportunities.get(listing_id).map(|o| o.value().clone()))
    }
}
