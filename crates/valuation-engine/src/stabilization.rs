//! Rent-stabilization likelihood.
//!
//! A stabilization claim has legal weight, so the estimator favours precision:
//!
//! 1. Direct regulatory language in the listing text is terminal (95-100).
//! 2. Without a registry match above the similarity threshold the result is
//!    pinned at [`NO_REGISTRY_CAP`], whatever the circumstantial signals say.
//! 3. With a registry match, a base of 40 plus bounded bonuses for match
//!    strength, construction era, unit count, rent level and building type,
//!    clamped to [15, 95].
//!
//! Every path returns its evidence chain sorted by descending weight.

use std::sync::LazyLock;

use listing_core::{
    EvidenceItem, EvidenceKind, Listing, OracleHints, PropertyKind, RegistryRecord,
    StabilizationAssessment,
};
use regex::Regex;

use crate::address::{AddressMatcher, RegistryMatch};

pub const MIN_PROBABILITY: i32 = 15;
pub const MAX_HEURISTIC_PROBABILITY: i32 = 95;
/// Ceiling when no registry record supports the claim
pub const NO_REGISTRY_CAP: i32 = 15;
const REGISTRY_MATCH_BASE: i32 = 40;

/// (pattern, probability) pairs for direct regulatory language
static EXPLICIT_PATTERNS: LazyLock<Vec<(Regex, u8)>> = LazyLock::new(|| {
    [
        (r"(?i)\brent[\s-]+stabili[sz](?:ed|ation)\b", 100),
        (r"(?i)\brent[\s-]+controll?ed\b", 100),
        (r"(?i)\brent[\s-]+regulated\b", 98),
        (r"(?i)\bDHCR\b", 98),
        (r"(?i)\bpreferential\s+rent\b", 95),
        (r"(?i)\bstabili[sz]ed\s+(?:lease|unit|apartment|apt)\b", 95),
    ]
    .into_iter()
    .map(|(p, prob)| (Regex::new(p).expect("valid explicit-text regex"), prob))
    .collect()
});

/// Negation cue directly in front of an explicit phrase ("not rent
/// stabilized", "no longer a stabilized unit")
static NEGATION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:not|non|never|no\s+longer|isn't|wasn't)[\s-]+(?:an?\s+)?$")
        .expect("valid negation regex")
});

/// How far back from an explicit phrase a negation cue is looked for
const NEGATION_WINDOW_CHARS: usize = 24;

static UNIT_COUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,4})[\s-]*(?:units?|apartments|family|residences)\b")
        .expect("valid unit-count regex")
});

static TAX_ABATEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(421[\s-]?a|j[\s-]?51)\b").expect("valid abatement regex")
});

static LUXURY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:luxury|condo\s+conversion|converted\s+to\s+condos?|new\s+development|newly\s+constructed|boutique\s+condo)\b",
    )
    .expect("valid luxury regex")
});

static TRADITIONAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:walk[\s-]?up|pre[\s-]?war|tenement|rental\s+building|elevator\s+building)\b")
        .expect("valid building-type regex")
});

static MULTI_UNIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:elevator\s+building|apartment\s+building|apartment\s+complex)\b")
        .expect("valid multi-unit regex")
});

/// Extra inputs beyond the listing itself
#[derive(Debug, Clone, Default)]
pub struct StabilizationContext<'a> {
    /// Naive per-bedroom market estimate for the listing
    pub naive_estimate: Option<f64>,
    pub hints: Option<&'a OracleHints>,
}

#[derive(Debug, Clone)]
pub struct StabilizationConfig {
    /// Registry similarity a match must exceed
    pub match_threshold: f64,
    /// Rent at or below this share of the naive estimate counts as materially low
    pub rent_level_ratio: f64,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.6,
            rent_level_ratio: 0.85,
        }
    }
}

pub struct StabilizationEstimator {
    /// `None` when the registry could not be loaded
    matcher: Option<AddressMatcher>,
    config: StabilizationConfig,
}

impl StabilizationEstimator {
    pub fn new(registry: Option<Vec<RegistryRecord>>, config: StabilizationConfig) -> Self {
        Self {
            matcher: registry.map(AddressMatcher::new),
            config,
        }
    }

    pub fn registry_available(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn estimate(&self, listing: &Listing, ctx: &StabilizationContext<'_>) -> StabilizationAssessment {
        if let Some(explicit) = explicit_text_evidence(&listing.description) {
            return explicit;
        }

        let matcher = match &self.matcher {
            Some(m) => m,
            None => {
                let cap = EvidenceItem::new(
                    EvidenceKind::RegistryUnavailable,
                    NO_REGISTRY_CAP,
                    "Registry data unavailable; estimate held at the conservative floor",
                );
                return capped(cap, self.circumstantial(listing, ctx));
            }
        };

        match matcher.best_match(&listing.address, self.config.match_threshold) {
            Some(registry_match) => self.with_registry_match(listing, ctx, &registry_match),
            None => {
                let cap = EvidenceItem::new(
                    EvidenceKind::RegistryMatch,
                    NO_REGISTRY_CAP,
                    format!(
                        "No registry record above {:.0}% address similarity; circumstantial signals ignored",
                        self.config.match_threshold * 100.0
                    ),
                );
                capped(cap, self.circumstantial(listing, ctx))
            }
        }
    }

    fn with_registry_match(
        &self,
        listing: &Listing,
        ctx: &StabilizationContext<'_>,
        registry_match: &RegistryMatch,
    ) -> StabilizationAssessment {
        let (strength, bonus) = if registry_match.similarity >= 0.9 {
            ("strong", 35)
        } else if registry_match.similarity >= 0.7 {
            ("good", 25)
        } else {
            ("weak", 15)
        };

        let mut evidence = vec![EvidenceItem::new(
            EvidenceKind::RegistryMatch,
            bonus,
            format!(
                "{} registry match: \"{}\" ({}), similarity {:.2}",
                strength,
                registry_match.record.address,
                registry_match.record.jurisdiction_code,
                registry_match.similarity
            ),
        )];
        evidence.extend(self.circumstantial(listing, ctx));

        let total: i32 = REGISTRY_MATCH_BASE + evidence.iter().map(|e| e.weight).sum::<i32>();
        let probability = total.clamp(MIN_PROBABILITY, MAX_HEURISTIC_PROBABILITY) as u8;

        sort_by_weight(&mut evidence);
        StabilizationAssessment {
            probability,
            evidence,
        }
    }

    /// Building-age, unit-count, rent-level and building-type signals
    fn circumstantial(&self, listing: &Listing, ctx: &StabilizationContext<'_>) -> Vec<EvidenceItem> {
        let mut items = Vec::new();
        items.extend(era_evidence(listing));
        items.extend(unit_count_evidence(listing, ctx.hints));
        items.extend(self.rent_level_evidence(listing, ctx.naive_estimate));
        items.extend(building_type_evidence(listing, ctx.hints));
        items
    }

    fn rent_level_evidence(&self, listing: &Listing, naive_estimate: Option<f64>) -> Option<EvidenceItem> {
        if listing.property_kind != PropertyKind::Rental {
            return None;
        }
        let naive = naive_estimate.filter(|n| *n > 0.0)?;
        if listing.price > naive * self.config.rent_level_ratio {
            return None;
        }
        let below = (naive - listing.price) / naive * 100.0;
        Some(EvidenceItem::new(
            EvidenceKind::RentLevel,
            10,
            format!(
                "Rent ${:.0} is {:.0}% below the per-bedroom market estimate of ${:.0}",
                listing.price, below, naive
            ),
        ))
    }
}

/// True when the text just before `start`, within the same clause, ends in
/// a negation cue.
fn is_negated(description: &str, start: usize) -> bool {
    let before = &description[..start];
    let clause = before
        .rfind(|c: char| matches!(c, '.' | ';' | '!' | '?' | '\n'))
        .map_or(before, |i| &before[i + 1..]);
    let window = clause
        .char_indices()
        .rev()
        .nth(NEGATION_WINDOW_CHARS - 1)
        .map_or(clause, |(i, _)| &clause[i..]);
    NEGATION_CUE.is_match(window)
}

fn explicit_text_evidence(description: &str) -> Option<StabilizationAssessment> {
    if description.is_empty() {
        return None;
    }

    let (matched, probability) = EXPLICIT_PATTERNS
        .iter()
        .filter_map(|(re, prob)| {
            re.find_iter(description)
                .find(|m| !is_negated(description, m.start()))
                .map(|m| (m.as_str().to_string(), *prob))
        })
        .max_by_key(|(_, prob)| *prob)?;

    Some(StabilizationAssessment {
        probability,
        evidence: vec![EvidenceItem::new(
            EvidenceKind::ExplicitText,
            probability as i32,
            format!("Listing text states \"{}\"", matched),
        )],
    })
}

fn era_evidence(listing: &Listing) -> Option<EvidenceItem> {
    let year = listing.built_year?;
    if year < 1947 {
        Some(EvidenceItem::new(
            EvidenceKind::BuildingAge,
            20,
            format!("Built {}, before 1947 (rent-control era)", year),
        ))
    } else if year <= 1973 {
        Some(EvidenceItem::new(
            EvidenceKind::BuildingAge,
            15,
            format!("Built {}, inside the 1947-1973 stabilization window", year),
        ))
    } else {
        TAX_ABATEMENT_PATTERN.find(&listing.description).map(|m| {
            EvidenceItem::new(
                EvidenceKind::BuildingAge,
                10,
                format!("Built {} with a {} tax abatement", year, m.as_str().to_uppercase()),
            )
        })
    }
}

/// Hinted unit count first, then a count stated in the text, then
/// building-type wording that implies six or more units.
fn estimated_units(listing: &Listing, hints: Option<&OracleHints>) -> Option<(u32, &'static str)> {
    if let Some(units) = hints.and_then(|h| h.estimated_units) {
        return Some((units, "market estimate"));
    }
    let stated = UNIT_COUNT_PATTERN
        .captures_iter(&listing.description)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u32>().ok()))
        .max();
    if let Some(units) = stated {
        return Some((units, "listing text"));
    }
    MULTI_UNIT_PATTERN
        .is_match(&listing.description)
        .then_some((6, "building description"))
}

fn unit_count_evidence(listing: &Listing, hints: Option<&OracleHints>) -> Option<EvidenceItem> {
    let (units, source) = estimated_units(listing, hints)?;
    (units >= 6).then(|| {
        EvidenceItem::new(
            EvidenceKind::UnitCount,
            10,
            format!("Estimated {}+ units in the building (from {})", units, source),
        )
    })
}

fn building_type_evidence(listing: &Listing, hints: Option<&OracleHints>) -> Option<EvidenceItem> {
    let hinted_luxury = hints.and_then(|h| h.luxury_building) == Some(true);
    if hinted_luxury || LUXURY_PATTERN.is_match(&listing.description) {
        return Some(EvidenceItem::new(
            EvidenceKind::BuildingType,
            -10,
            "Luxury or condo-conversion building",
        ));
    }
    TRADITIONAL_PATTERN.find(&listing.description).map(|m| {
        EvidenceItem::new(
            EvidenceKind::BuildingType,
            5,
            format!("Traditional rental building ({})", m.as_str().to_lowercase()),
        )
    })
}

/// Capped path: the cap item leads, circumstantial items are listed with
/// zero weight because they did not move the estimate.
fn capped(cap: EvidenceItem, circumstantial: Vec<EvidenceItem>) -> StabilizationAssessment {
    let probability = cap.weight.clamp(MIN_PROBABILITY, NO_REGISTRY_CAP) as u8;
    let mut evidence = vec![cap];
    evidence.extend(circumstantial.into_iter().map(|mut item| {
        item.weight = 0;
        item.description = format!("{} (not counted without a registry match)", item.description);
        item
    }));
    sort_by_weight(&mut evidence);
    StabilizationAssessment {
        probability,
        evidence,
    }
}

/// Stable, so equal weights keep insertion order
fn sort_by_weight(evidence: &mut [EvidenceItem]) {
    evidence.sort_by(|a, b| b.weight.cmp(&a.weight));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn rental(address: &str, built_year: Option<i32>, description: &str) -> Listing {
        Listing {
            id: "R1".to_string(),
            address: address.to_string(),
            price: 2400.0,
            bedrooms: 2,
            bathrooms: 1.0,
            sqft: Some(700),
            built_year,
            neighborhood: "washington-heights".to_string(),
            amenities: BTreeSet::new(),
            description: description.to_string(),
            property_kind: PropertyKind::Rental,
        }
    }

    fn registry(addresses: &[&str]) -> Option<Vec<RegistryRecord>> {
        Some(
            addresses
                .iter()
                .map(|a| RegistryRecord {
                    address: a.to_string(),
                    jurisdiction_code: "MN-12".to_string(),
                })
                .collect(),
        )
    }

    fn estimator(addresses: &[&str]) -> StabilizationEstimator {
        StabilizationEstimator::new(registry(addresses), StabilizationConfig::default())
    }

    #[test]
    fn test_explicit_text_is_terminal() {
        let est = estimator(&[]);
        let listing = rental("1 Nowhere Pl", None, "Sunny 2BR. Rent Stabilized lease, renews yearly.");
        let result = est.estimate(&listing, &StabilizationContext::default());
        assert_eq!(result.probability, 100);
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].kind, EvidenceKind::ExplicitText);

        let preferential = rental("1 Nowhere Pl", None, "Preferential rent of $2,100 for the first year");
        let result = est.estimate(&preferential, &StabilizationContext::default());
        assert_eq!(result.probability, 95);
    }

    #[test]
    fn test_negated_language_is_not_explicit() {
        let est = estimator(&[]);
        let listing = rental("1 Nowhere Pl", None, "This unit is NOT rent stabilized.");
        let result = est.estimate(&listing, &StabilizationContext::default());
        assert_eq!(result.probability, 15);
        assert_ne!(result.evidence[0].kind, EvidenceKind::ExplicitText);

        let lapsed = rental("1 Nowhere Pl", None, "Apartment is no longer a stabilized unit");
        let result = est.estimate(&lapsed, &StabilizationContext::default());
        assert_eq!(result.probability, 15);
    }

    #[test]
    fn test_unrelated_negation_keeps_explicit_text() {
        let est = estimator(&[]);
        let listing = rental(
            "1 Nowhere Pl",
            None,
            "Rent stabilized 2BR with lease renewal. Heat is not controlled by tenant.",
        );
        let result = est.estimate(&listing, &StabilizationContext::default());
        assert_eq!(result.probability, 100);
        assert_eq!(result.evidence[0].kind, EvidenceKind::ExplicitText);

        let mixed = rental(
            "1 Nowhere Pl",
            None,
            "Not rent controlled, but the lease is rent stabilized.",
        );
        let result = est.estimate(&mixed, &StabilizationContext::default());
        assert_eq!(result.probability, 100);
        assert_eq!(result.evidence[0].description, "Listing text states \"rent stabilized\"");
    }

    #[test]
    fn test_no_registry_match_caps_regardless_of_signals() {
        let est = estimator(&["456 Main St"]);
        let listing = rental(
            "123 Main St",
            Some(1925),
            "Classic pre-war walk-up, 24 units, elevator building",
        );
        let hints = OracleHints {
            luxury_building: Some(false),
            estimated_units: Some(40),
        };
        let ctx = StabilizationContext {
            naive_estimate: Some(4000.0),
            hints: Some(&hints),
        };
        let result = est.estimate(&listing, &ctx);
        assert_eq!(result.probability, 15);
        assert_eq!(result.evidence[0].kind, EvidenceKind::RegistryMatch);
        assert!(result.evidence.iter().skip(1).all(|e| e.weight == 0));
        assert!(result.evidence.iter().any(|e| e.kind == EvidenceKind::BuildingAge));
    }

    #[test]
    fn test_registry_unavailable_is_conservative() {
        let est = StabilizationEstimator::new(None, StabilizationConfig::default());
        assert!(!est.registry_available());
        let listing = rental("123 Main St", Some(1925), "walk-up");
        let result = est.estimate(&listing, &StabilizationContext::default());
        assert_eq!(result.probability, 15);
        assert_eq!(result.evidence[0].kind, EvidenceKind::RegistryUnavailable);
    }

    #[test]
    fn test_registry_match_accumulates_bonuses() {
        let est = estimator(&["123 Main Street"]);
        let listing = rental("123 Main St Apt 4", Some(1931), "Renovated pre-war 2BR in a 20 unit building");
        let ctx = StabilizationContext {
            naive_estimate: Some(3000.0),
            hints: None,
        };
        let result = est.estimate(&listing, &ctx);
        // 40 + 35 strong + 20 era + 10 units + 10 rent (2400 <= 2550) + 5 pre-war = 120 -> 95
        assert_eq!(result.probability, 95);
        assert_eq!(result.evidence[0].kind, EvidenceKind::RegistryMatch);
        assert_eq!(result.evidence[0].weight, 35);
        let weights: Vec<i32> = result.evidence.iter().map(|e| e.weight).collect();
        assert!(weights.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_luxury_penalty_and_weak_match() {
        let est = estimator(&["West 64 St Annex Building"]);
        let listing = rental("West 64th St", Some(2015), "Luxury high-rise");
        let result = est.estimate(&listing, &StabilizationContext::default());
        // overlap {w, 64, st} / {w, 64, st, annex, building} = 0.6, not above 0.6
        assert_eq!(result.probability, 15);

        let est = estimator(&["West 64 St Annex"]);
        let result = est.estimate(&listing, &StabilizationContext::default());
        // 3/4 = 0.75 -> good match +25, luxury -10: 40 + 25 - 10 = 55
        assert_eq!(result.probability, 55);
        assert_eq!(result.evidence.last().map(|e| e.weight), Some(-10));
    }

    #[test]
    fn test_rent_level_only_for_rentals() {
        let est = estimator(&["123 Main St"]);
        let mut listing = rental("123 Main St", None, "");
        let ctx = StabilizationContext {
            naive_estimate: Some(4000.0),
            hints: None,
        };
        let rental_result = est.estimate(&listing, &ctx);
        assert_eq!(rental_result.probability, 85);

        listing.property_kind = PropertyKind::Sale;
        let sale_result = est.estimate(&listing, &ctx);
        assert_eq!(sale_result.probability, 75);
    }

    #[test]
    fn test_probability_bounds_across_inputs() {
        let est = estimator(&["123 Main St", "77 Bleecker St"]);
        let descriptions = [
            "",
            "luxury condo conversion",
            "pre-war walk-up 8 units",
            "421-a building",
            "rent controlled",
            "DHCR registered",
        ];
        for address in ["123 Main St", "77 Bleecker Street", "9 Unknown Ave", "Bleecker St"] {
            for year in [None, Some(1900), Some(1960), Some(1990)] {
                for description in descriptions {
                    let listing = rental(address, year, description);
                    let result = est.estimate(&listing, &StabilizationContext::default());
                    let explicit = result.evidence[0].kind == EvidenceKind::ExplicitText;
                    if explicit {
                        assert!(result.probability >= 95);
                    } else {
                        assert!((15..=95).contains(&result.probability));
                    }
                }
            }
        }
    }

    #[test]
    fn test_tax_abatement_era() {
        let listing = rental("1 A St", Some(1998), "Building participates in 421a program");
        let item = era_evidence(&listing).unwrap();
        assert_eq!(item.weight, 10);
        assert!(item.description.contains("421A"));
        assert!(era_evidence(&rental("1 A St", Some(1998), "")).is_none());
    }
}
