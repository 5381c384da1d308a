//! Listing freshness state machine.
//!
//! Each neighborhood snapshot is diffed against the persisted entries for
//! that neighborhood. Only listings that are new, repriced, relisted, stale
//! or still awaiting a successful analysis are handed back for evaluation.

use chrono::{DateTime, Duration, Utc};
use listing_core::{
    CacheEntry, CacheFilter, CacheStatus, EngineError, Listing, OpportunityStatus, Store,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Consecutive absent fetches before an entry is marked vacated
    pub vacate_after_misses: u32,
    /// Analyzed entries older than this are re-evaluated. `None` disables.
    pub reanalyze_after: Option<Duration>,
    /// Price differences at or below this are treated as unchanged
    pub price_tolerance: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            vacate_after_misses: 1,
            reanalyze_after: Some(Duration::days(14)),
            price_tolerance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeKind {
    New,
    PriceChanged { previous: f64 },
    Unchanged,
    Stale,
    /// Seen again after being marked vacated
    Relisted,
    Vacated,
    /// Absent, but below the vacate threshold
    Missing,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::PriceChanged { .. } => "priceChanged",
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Stale => "stale",
            ChangeKind::Relisted => "relisted",
            ChangeKind::Vacated => "vacated",
            ChangeKind::Missing => "missing",
        }
    }

    /// Whether a stored result for the listing stops being current
    pub fn invalidates_result(&self) -> bool {
        matches!(self, ChangeKind::PriceChanged { .. } | ChangeKind::Relisted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingChange {
    pub listing_id: String,
    pub kind: ChangeKind,
    pub needs_analysis: bool,
}

/// Outcome of reconciling one snapshot
#[derive(Debug, Clone, Default)]
pub struct CacheDiff {
    pub neighborhood: String,
    /// Snapshot with duplicate ids collapsed, first occurrence kept
    pub snapshot: Vec<Listing>,
    pub changes: Vec<ListingChange>,
    /// Entries written back to the store, keyed by listing id
    pub entries: BTreeMap<String, CacheEntry>,
    pub duplicates: usize,
    /// Opportunities retracted while persisting the diff
    pub retracted: usize,
}

impl CacheDiff {
    pub fn to_analyze(&self) -> Vec<&Listing> {
        let wanted: HashSet<&str> = self
            .changes
            .iter()
            .filter(|c| c.needs_analysis)
            .map(|c| c.listing_id.as_str())
            .collect();
        self.snapshot
            .iter()
            .filter(|l| wanted.contains(l.id.as_str()))
            .collect()
    }

    pub fn invalidated(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind.invalidates_result())
            .map(|c| c.listing_id.as_str())
            .collect()
    }

    pub fn vacated(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Vacated)
            .map(|c| c.listing_id.as_str())
            .collect()
    }

    pub fn change(&self, listing_id: &str) -> Option<&ListingChange> {
        self.changes.iter().find(|c| c.listing_id == listing_id)
    }

    pub fn entry(&self, listing_id: &str) -> Option<&CacheEntry> {
        self.entries.get(listing_id)
    }

    pub fn count(&self, label: &str) -> usize {
        self.changes.iter().filter(|c| c.kind.label() == label).count()
    }
}

pub struct ListingCache {
    store: Arc<dyn Store>,
    config: CacheConfig,
}

impl ListingCache {
    pub fn new(store: Arc<dyn Store>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match (self.config.reanalyze_after, entry.last_analyzed_at) {
            (Some(max_age), Some(analyzed_at)) => now - analyzed_at > max_age,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Classify every listing in `snapshot` and every prior entry missing
    /// from it. Pure: nothing is written.
    pub fn diff(
        &self,
        neighborhood: &str,
        snapshot: Vec<Listing>,
        prior: Vec<CacheEntry>,
        now: DateTime<Utc>,
    ) -> CacheDiff {
        let mut diff = CacheDiff {
            neighborhood: neighborhood.to_string(),
            ..Default::default()
        };

        let mut seen: HashSet<String> = HashSet::new();
        for listing in snapshot {
            if seen.insert(listing.id.clone()) {
                diff.snapshot.push(listing);
            } else {
                diff.duplicates += 1;
            }
        }

        let mut prior: HashMap<String, CacheEntry> = prior
            .into_iter()
            .map(|e| (e.listing_id.clone(), e))
            .collect();

        for listing in &diff.snapshot {
            let (entry, kind, needs_analysis) = match prior.remove(&listing.id) {
                None => (
                    CacheEntry::first_sighting(listing, neighborhood, now),
                    ChangeKind::New,
                    true,
                ),
                Some(mut entry) => {
                    let previous = entry.price;
                    entry.last_seen_at = now;
                    entry.missed_fetches = 0;
                    entry.neighborhood = neighborhood.to_string();

                    if entry.status == CacheStatus::LikelyVacated {
                        entry.price = listing.price;
                        entry.status = CacheStatus::Pending;
                        (entry, ChangeKind::Relisted, true)
                    } else if (listing.price - previous).abs() > self.config.price_tolerance {
                        entry.price = listing.price;
                        entry.status = CacheStatus::Pending;
                        (entry, ChangeKind::PriceChanged { previous }, true)
                    } else if entry.status != CacheStatus::Analyzed {
                        // pending or failed: retry
                        (entry, ChangeKind::Unchanged, true)
                    } else if self.is_stale(&entry, now) {
                        (entry, ChangeKind::Stale, true)
                    } else {
                        (entry, ChangeKind::Unchanged, false)
                    }
                }
            };
            diff.changes.push(ListingChange {
                listing_id: listing.id.clone(),
                kind,
                needs_analysis,
            });
            diff.entries.insert(entry.listing_id.clone(), entry);
        }

        let mut absent: Vec<CacheEntry> = prior
            .into_values()
            .filter(|e| e.status != CacheStatus::LikelyVacated)
            .collect();
        absent.sort_by(|a, b| a.listing_id.cmp(&b.listing_id));

        for mut entry in absent {
            entry.missed_fetches += 1;
            let kind = if entry.missed_fetches >= self.config.vacate_after_misses {
                entry.status = CacheStatus::LikelyVacated;
                ChangeKind::Vacated
            } else {
                ChangeKind::Missing
            };
            diff.changes.push(ListingChange {
                listing_id: entry.listing_id.clone(),
                kind,
                needs_analysis: false,
            });
            diff.entries.insert(entry.listing_id.clone(), entry);
        }

        diff
    }

    /// Diff a complete snapshot against the store and persist the outcome:
    /// entries are upserted, results of repriced or relisted listings are
    /// invalidated and their opportunities retracted, and opportunities of
    /// vacated listings are retracted.
    ///
    /// Only call this with a complete snapshot. A partial one would be read
    /// as vacancies.
    pub async fn reconcile(
        &self,
        neighborhood: &str,
        snapshot: Vec<Listing>,
        now: DateTime<Utc>,
    ) -> Result<CacheDiff, EngineError> {
        let prior = self
            .store
            .query_by_neighborhood(neighborhood, CacheFilter::All)
            .await?;
        let mut diff = self.diff(neighborhood, snapshot, prior, now);

        if diff.duplicates > 0 {
            tracing::debug!(
                "{}: dropped {} duplicate listing ids from snapshot",
                neighborhood,
                diff.duplicates
            );
        }

        for entry in diff.entries.values() {
            self.store.upsert_entry(entry).await?;
        }

        let mut retracted = 0;
        for listing_id in diff.invalidated() {
            self.store.invalidate_result(listing_id, now).await?;
            retracted += self.retract_opportunity(listing_id, now).await? as usize;
        }

        for listing_id in diff.vacated() {
            tracing::debug!("{}: listing {} likely vacated", neighborhood, listing_id);
            retracted += self.retract_opportunity(listing_id, now).await? as usize;
        }
        diff.retracted = retracted;

        tracing::info!(
            "{}: {} listings, {} new, {} repriced, {} relisted, {} stale, {} vacated, {} to analyze",
            neighborhood,
            diff.snapshot.len(),
            diff.count("new"),
            diff.count("priceChanged"),
            diff.count("relisted"),
            diff.count("stale"),
            diff.vacated().len(),
            diff.to_analyze().len()
        );

        Ok(diff)
    }

    /// Record a completed evaluation.
    pub async fn mark_analyzed(
        &self,
        entry: &CacheEntry,
        at: DateTime<Utc>,
    ) -> Result<CacheEntry, EngineError> {
        let mut updated = entry.clone();
        updated.status = CacheStatus::Analyzed;
        updated.last_analyzed_at = Some(at);
        self.store.upsert_entry(&updated).await?;
        Ok(updated)
    }

    /// Record an evaluation that could not reach the oracle. The entry is
    /// retried on the next cycle.
    pub async fn mark_failed(
        &self,
        entry: &CacheEntry,
        at: DateTime<Utc>,
    ) -> Result<CacheEntry, EngineError> {
        let mut updated = entry.clone();
        updated.status = CacheStatus::Failed;
        updated.last_analyzed_at = Some(at);
        self.store.upsert_entry(&updated).await?;
        Ok(updated)
    }

    /// Flip a published opportunity to retracted. Returns whether anything
    /// was retracted.
    pub async fn retract_opportunity(
        &self,
        listing_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        match self.store.opportunity(listing_id).await? {
            Some(mut opportunity) if opportunity.status == OpportunityStatus::Published => {
                opportunity.status = OpportunityStatus::Retracted;
                opportunity.updated_at = at;
                self.store.upsert_opportunity(&opportunity).await?;
                tracing::info!("Retracted opportunity for listing {}", listing_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
