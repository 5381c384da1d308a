//! Comparable selection.
//!
//! The selector walks an ordered cascade of (tier, predicate) pairs and
//! returns the first tier whose filtered pool reaches that tier's minimum
//! sample. Tiers are never mixed, and the output is sorted by listing id so
//! the pool's order has no effect.

use listing_core::{ComparableSet, Listing, MatchTier};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Amenity spellings folded onto one canonical name
const AMENITY_SYNONYMS: &[(&str, &str)] = &[
    ("concierge", "doorman"),
    ("door man", "doorman"),
    ("full time doorman", "doorman"),
    ("part time doorman", "doorman"),
    ("virtual doorman", "doorman"),
    ("attended lobby", "doorman"),
    ("fitness center", "gym"),
    ("fitness room", "gym"),
    ("health club", "gym"),
    ("laundry in building", "laundry"),
    ("laundry room", "laundry"),
    ("shared laundry", "laundry"),
    ("washer dryer", "washer dryer in unit"),
    ("washer/dryer", "washer dryer in unit"),
    ("in unit laundry", "washer dryer in unit"),
    ("w/d", "washer dryer in unit"),
    ("roof deck", "roof access"),
    ("rooftop", "roof access"),
    ("rooftop deck", "roof access"),
    ("common roof deck", "roof access"),
    ("pets allowed", "pet friendly"),
    ("dogs allowed", "pet friendly"),
    ("cats allowed", "pet friendly"),
    ("elevator building", "elevator"),
    ("private outdoor space", "outdoor space"),
    ("balcony", "outdoor space"),
    ("terrace", "outdoor space"),
    ("patio", "outdoor space"),
    ("central air", "central ac"),
    ("central a/c", "central ac"),
    ("dish washer", "dishwasher"),
];

/// Lowercase, collapse separators and fold synonyms.
pub fn normalize_amenity(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    AMENITY_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == collapsed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(collapsed)
}

pub fn normalize_amenities<'a>(raw: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    raw.into_iter()
        .map(|a| normalize_amenity(a))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Jaccard overlap of two normalized amenity sets. Two empty sets are
/// identical and overlap fully.
pub fn amenity_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone)]
pub struct ComparableSelector {
    /// Minimum amenity overlap for the exact tier
    pub min_amenity_overlap: f64,
    /// Maximum bathroom difference for the exact and bedBath tiers
    pub bath_tolerance: f64,
}

impl Default for ComparableSelector {
    fn default() -> Self {
        Self {
            min_amenity_overlap: 0.5,
            bath_tolerance: 0.5,
        }
    }
}

impl ComparableSelector {
    pub fn new(min_amenity_overlap: f64, bath_tolerance: f64) -> Self {
        Self {
            min_amenity_overlap,
            bath_tolerance,
        }
    }

    fn same_bedrooms(target: &Listing, candidate: &Listing) -> bool {
        target.bedrooms == candidate.bedrooms
    }

    fn similar_baths(&self, target: &Listing, candidate: &Listing) -> bool {
        (target.bathrooms - candidate.bathrooms).abs() <= self.bath_tolerance
    }

    /// Select the comparable set for `target` out of `pool`.
    ///
    /// The target itself and listings of a different property kind are never
    /// used as comparables.
    pub fn select(&self, target: &Listing, pool: &[Listing]) -> ComparableSet {
        let mut candidates: Vec<&Listing> = pool
            .iter()
            .filter(|c| c.id != target.id && c.property_kind == target.property_kind)
            .collect();
        // one listing per id, the same one whatever the pool order
        candidates.sort_by(|a, b| canonical_order(a, b));
        candidates.dedup_by(|later, first| later.id == first.id);

        let target_amenities = normalize_amenities(&target.amenities);

        let exact = |c: &Listing| {
            Self::same_bedrooms(target, c)
                && self.similar_baths(target, c)
                && amenity_overlap(&target_amenities, &normalize_amenities(&c.amenities))
                    >= self.min_amenity_overlap
        };
        let bed_bath = |c: &Listing| Self::same_bedrooms(target, c) && self.similar_baths(target, c);
        let bedroom_only = |c: &Listing| Self::same_bedrooms(target, c);

        let cascade: [(MatchTier, &dyn Fn(&Listing) -> bool); 3] = [
            (MatchTier::Exact, &exact),
            (MatchTier::BedBath, &bed_bath),
            (MatchTier::BedroomOnly, &bedroom_only),
        ];

        for (tier, predicate) in cascade {
            let matched: Vec<&Listing> = candidates.iter().copied().filter(|c| predicate(c)).collect();
            if matched.len() >= tier.min_sample().unwrap_or(0) {
                return Self::build(tier, matched);
            }
        }

        Self::build(MatchTier::Fallback, candidates)
    }

    /// `matched` is already in id order.
    fn build(tier: MatchTier, matched: Vec<&Listing>) -> ComparableSet {
        let comparables: Vec<Listing> = matched.into_iter().cloned().collect();
        ComparableSet { tier, comparables }
    }
}

/// Total order over every field that can differ between two candidates,
/// id first.
fn canonical_order(a: &Listing, b: &Listing) -> Ordering {
    a.id.cmp(&b.id)
        .then_with(|| a.price.total_cmp(&b.price))
        .then_with(|| a.bedrooms.cmp(&b.bedrooms))
        .then_with(|| a.bathrooms.total_cmp(&b.bathrooms))
        .then_with(|| a.sqft.cmp(&b.sqft))
        .then_with(|| a.built_year.cmp(&b.built_year))
        .then_with(|| a.amenities.cmp(&b.amenities))
        .then_with(|| a.address.cmp(&b.address))
        .then_with(|| a.neighborhood.cmp(&b.neighborhood))
        .then_with(|| a.description.cmp(&b.description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_core::PropertyKind;

    fn unit(id: &str, bedrooms: u32, bathrooms: f64, amenities: &[&str]) -> Listing {
        Listing {
            id: id.to_string(),
            address: format!("{id} Avenue A"),
            price: 3500.0,
            bedrooms,
            bathrooms,
            sqft: None,
            built_year: None,
            neighborhood: "east-village".to_string(),
            amenities: amenities.iter().map(|a| a.to_string()).collect(),
            description: String::new(),
            property_kind: PropertyKind::Rental,
        }
    }

    fn pool_of(n: usize, bedrooms: u32, bathrooms: f64, amenities: &[&str], prefix: &str) -> Vec<Listing> {
        (0..n)
            .map(|i| unit(&format!("{prefix}{i:02}"), bedrooms, bathrooms, amenities))
            .collect()
    }

    #[test]
    fn test_amenity_synonyms() {
        assert_eq!(normalize_amenity("Concierge"), "doorman");
        assert_eq!(normalize_amenity("  Fitness-Center "), "gym");
        assert_eq!(normalize_amenity("Washer/Dryer"), "washer dryer in unit");
        assert_eq!(normalize_amenity("Dishwasher"), "dishwasher");
    }

    #[test]
    fn test_amenity_overlap() {
        let a: BTreeSet<String> = ["doorman", "gym"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["doorman", "laundry"].iter().map(|s| s.to_string()).collect();
        assert!((amenity_overlap(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(amenity_overlap(&BTreeSet::new(), &BTreeSet::new()), 1.0);
        assert_eq!(amenity_overlap(&a, &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_exact_tier_with_synonyms() {
        let target = unit("T", 2, 1.0, &["concierge", "gym"]);
        let mut pool = pool_of(3, 2, 1.5, &["doorman", "fitness center"], "E");
        pool.extend(pool_of(10, 2, 1.0, &["laundry"], "B"));

        let set = ComparableSelector::default().select(&target, &pool);
        assert_eq!(set.tier, MatchTier::Exact);
        assert_eq!(set.len(), 3);
        assert!(set.comparables.iter().all(|c| c.id.starts_with('E')));
    }

    #[test]
    fn test_escalates_to_bed_bath() {
        let target = unit("T", 2, 1.0, &["doorman"]);
        let mut pool = pool_of(2, 2, 1.0, &["doorman"], "E");
        pool.extend(pool_of(6, 2, 1.5, &["laundry"], "B"));
        pool.extend(pool_of(5, 2, 3.0, &[], "X"));

        let set = ComparableSelector::default().select(&target, &pool);
        assert_eq!(set.tier, MatchTier::BedBath);
        assert_eq!(set.len(), 8);
    }

    #[test]
    fn test_escalates_to_bedroom_only_then_fallback() {
        let target = unit("T", 1, 1.0, &[]);
        let mut pool = pool_of(12, 1, 2.5, &[], "R");
        pool.extend(pool_of(4, 3, 2.0, &[], "Z"));
        let set = ComparableSelector::default().select(&target, &pool);
        assert_eq!(set.tier, MatchTier::BedroomOnly);
        assert_eq!(set.len(), 12);

        let thin = pool_of(11, 1, 2.5, &[], "R");
        let set = ComparableSelector::default().select(&target, &thin);
        assert_eq!(set.tier, MatchTier::Fallback);
        assert_eq!(set.len(), 11);
    }

    #[test]
    fn test_excludes_target_and_other_kinds() {
        let target = unit("T", 2, 1.0, &[]);
        let mut sale = unit("S", 2, 1.0, &[]);
        sale.property_kind = PropertyKind::Sale;
        let pool = vec![target.clone(), sale];

        let set = ComparableSelector::default().select(&target, &pool);
        assert_eq!(set.tier, MatchTier::Fallback);
        assert!(set.is_empty());
    }

    #[test]
    fn test_selection_is_order_independent() {
        let target = unit("T", 2, 1.0, &["doorman"]);
        let mut pool = pool_of(4, 2, 1.0, &["doorman"], "E");
        pool.extend(pool_of(9, 2, 2.0, &[], "O"));
        let selector = ComparableSelector::default();

        let first = selector.select(&target, &pool);
        let mut reversed = pool.clone();
        reversed.reverse();
        let second = selector.select(&target, &reversed);
        let third = selector.select(&target, &pool);

        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_duplicate_ids_collapse_to_one() {
        let target = unit("T", 2, 1.0, &[]);
        let mut pool = pool_of(3, 2, 1.0, &[], "E");
        let mut reworded = pool[0].clone();
        reworded.description = "Updated listing copy".to_string();
        reworded.amenities = ["gym".to_string()].into_iter().collect();
        pool.push(reworded);
        let selector = ComparableSelector::default();

        let first = selector.select(&target, &pool);
        let mut reversed = pool.clone();
        reversed.reverse();
        let second = selector.select(&target, &reversed);

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }
}
