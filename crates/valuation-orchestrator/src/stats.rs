use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one batch run, returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub neighborhoods_processed: usize,
    /// Skipped because the snapshot could not be fetched or reconciled
    pub neighborhoods_failed: usize,
    pub listings_seen: usize,
    pub new_listings: usize,
    pub price_changes: usize,
    pub relisted: usize,
    pub stale: usize,
    pub vacated: usize,
    pub analyzed: usize,
    pub oracle_calls: usize,
    pub oracle_failures: usize,
    pub no_comparables: usize,
    pub undervalued: usize,
    pub opportunities_published: usize,
    pub opportunities_retracted: usize,
    pub reasoning_generated: usize,
    /// Listings whose result could not be persisted
    pub listing_errors: usize,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.neighborhoods_processed += other.neighborhoods_processed;
        self.neighborhoods_failed += other.neighborhoods_failed;
        self.listings_seen += other.listings_seen;
        self.new_listings += other.new_listings;
        self.price_changes += other.price_changes;
        self.relisted += other.relisted;
        self.stale += other.stale;
        self.vacated += other.vacated;
        self.analyzed += other.analyzed;
        self.oracle_calls += other.oracle_calls;
        self.oracle_failures += other.oracle_failures;
        self.no_comparables += other.no_comparables;
        self.undervalued += other.undervalued;
        self.opportunities_published += other.opportunities_published;
        self.opportunities_retracted += other.opportunities_retracted;
        self.reasoning_generated += other.reasoning_generated;
        self.listing_errors += other.listing_errors;
    }

    pub fn summary(&self) -> String {
        format!(
            "{} neighborhoods ({} failed), {} listings seen, {} analyzed, {} undervalued, \
             {} published, {} retracted, {} vacated, {} oracle failures",
            self.neighborhoods_processed,
            self.neighborhoods_failed,
            self.listings_seen,
            self.analyzed,
            self.undervalued,
            self.opportunities_published,
            self.opportunities_retracted,
            self.vacated,
            self.oracle_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adds_counters() {
        let mut total = RunStats {
            analyzed: 2,
            vacated: 1,
            ..Default::default()
        };
        total.merge(&RunStats {
            analyzed: 3,
            neighborhoods_failed: 1,
            ..Default::default()
        });
        assert_eq!(total.analyzed, 5);
        assert_eq!(total.vacated, 1);
        assert_eq!(total.neighborhoods_failed, 1);
    }
}
