//! Address normalization and fuzzy matching against registry records.
//!
//! Similarity is token-set Jaccard overlap with a hard gate on house numbers:
//! two addresses whose leading house numbers differ score exactly
//! [`HOUSE_NUMBER_MISMATCH`] no matter how much of the street name they share.

use listing_core::RegistryRecord;
use std::collections::{BTreeSet, HashMap};

/// Fixed similarity for addresses with different house numbers
pub const HOUSE_NUMBER_MISMATCH: f64 = 0.1;

/// Added to the token overlap when house numbers agree
const HOUSE_NUMBER_BOOST: f64 = 0.3;

/// Unit designators; the designator and the token after it are dropped
const UNIT_MARKERS: &[&str] = &["apt", "apartment", "unit", "ste", "suite", "fl", "floor", "rm"];

const SUFFIXES: &[(&str, &str)] = &[
    ("street", "st"),
    ("str", "st"),
    ("avenue", "ave"),
    ("av", "ave"),
    ("boulevard", "blvd"),
    ("place", "pl"),
    ("road", "rd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("terrace", "ter"),
    ("parkway", "pkwy"),
    ("square", "sq"),
    ("court", "ct"),
    ("east", "e"),
    ("west", "w"),
    ("north", "n"),
    ("south", "s"),
];

/// Tokenized form of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
    pub tokens: BTreeSet<String>,
    pub house_number: Option<String>,
}

impl NormalizedAddress {
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let mut words: Vec<String> = Vec::new();
        let mut skip_next = false;

        for word in lowered.split_whitespace() {
            if skip_next {
                skip_next = false;
                continue;
            }
            // "#4b" style unit numbers
            if word.starts_with('#') {
                continue;
            }
            let cleaned: String = word
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect();
            let cleaned = cleaned.trim_matches('-');
            if cleaned.is_empty() {
                continue;
            }
            if UNIT_MARKERS.contains(&cleaned) {
                skip_next = true;
                continue;
            }
            words.push(canonical_token(cleaned, words.is_empty()));
        }

        let house_number = words
            .first()
            .filter(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .cloned();

        Self {
            tokens: words.into_iter().collect(),
            house_number,
        }
    }
}

fn canonical_token(word: &str, leading: bool) -> String {
    if let Some((_, short)) = SUFFIXES.iter().find(|(long, _)| *long == word) {
        return short.to_string();
    }
    // "4th" -> "4", but never touch the house number itself
    if !leading {
        for ordinal in ["st", "nd", "rd", "th"] {
            if let Some(digits) = word.strip_suffix(ordinal) {
                if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                    return digits.to_string();
                }
            }
        }
    }
    word.to_string()
}

/// Similarity of two already-normalized addresses, in [0, 1]
pub fn normalized_similarity(a: &NormalizedAddress, b: &NormalizedAddress) -> f64 {
    if let (Some(ha), Some(hb)) = (&a.house_number, &b.house_number) {
        if ha != hb {
            return HOUSE_NUMBER_MISMATCH;
        }
    }

    let union = a.tokens.union(&b.tokens).count();
    if union == 0 {
        return 0.0;
    }
    let overlap = a.tokens.intersection(&b.tokens).count() as f64 / union as f64;

    match (&a.house_number, &b.house_number) {
        (Some(_), Some(_)) => (overlap + HOUSE_NUMBER_BOOST).min(1.0),
        _ => overlap,
    }
}

/// Similarity of two raw address strings, in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_similarity(&NormalizedAddress::parse(a), &NormalizedAddress::parse(b))
}

/// A registry record that matched a listing address
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryMatch {
    pub record: RegistryRecord,
    pub similarity: f64,
}

/// Pre-tokenized registry, indexed by house number.
///
/// Records whose house number differs from the query can only ever score
/// [`HOUSE_NUMBER_MISMATCH`], so they are skipped whenever the threshold is
/// above that value. Results are identical to a full scan.
pub struct AddressMatcher {
    records: Vec<(RegistryRecord, NormalizedAddress)>,
    by_house_number: HashMap<String, Vec<usize>>,
    without_number: Vec<usize>,
}

impl AddressMatcher {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        let mut by_house_number: HashMap<String, Vec<usize>> = HashMap::new();
        let mut without_number = Vec::new();
        let records: Vec<(RegistryRecord, NormalizedAddress)> = records
            .into_iter()
            .map(|r| {
                let normalized = NormalizedAddress::parse(&r.address);
                (r, normalized)
            })
            .collect();

        for (idx, (_, normalized)) in records.iter().enumerate() {
            match &normalized.house_number {
                Some(number) => by_house_number.entry(number.clone()).or_default().push(idx),
                None => without_number.push(idx),
            }
        }

        Self {
            records,
            by_house_number,
            without_number,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records scoring strictly above `threshold`, best first.
    /// Ties are broken by address so the order is stable.
    pub fn matches(&self, address: &str, threshold: f64) -> Vec<RegistryMatch> {
        let query = NormalizedAddress::parse(address);

        let candidates: Vec<usize> = match (&query.house_number, threshold >= HOUSE_NUMBER_MISMATCH) {
            (Some(number), true) => self
                .by_house_number
                .get(number)
                .into_iter()
                .flatten()
                .chain(self.without_number.iter())
                .copied()
                .collect(),
            _ => (0..self.records.len()).collect(),
        };

        let mut found: Vec<RegistryMatch> = candidates
            .into_iter()
            .filter_map(|idx| {
                let (record, normalized) = &self.records[idx];
                let score = normalized_similarity(&query, normalized);
                (score > threshold).then(|| RegistryMatch {
                    record: record.clone(),
                    similarity: score,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.address.cmp(&b.record.address))
        });
        found
    }

    pub fn best_match(&self, address: &str, threshold: f64) -> Option<RegistryMatch> {
        self.matches(address, threshold).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(address: &str) -> RegistryRecord {
        RegistryRecord {
            address: address.to_string(),
            jurisdiction_code: "MN".to_string(),
        }
    }

    #[test]
    fn test_different_house_numbers_hard_reject() {
        assert_eq!(similarity("123 Main St", "456 Main St"), HOUSE_NUMBER_MISMATCH);
        assert_eq!(
            similarity("123 West 4th Street Apt 5", "124 West 4th Street Apt 5"),
            HOUSE_NUMBER_MISMATCH
        );
    }

    #[test]
    fn test_suffix_and_case_normalization() {
        assert_relative_eq!(similarity("123 Main Street", "123 MAIN ST."), 1.0);
        assert_relative_eq!(similarity("55 East 4th Street", "55 E 4 St"), 1.0);
    }

    #[test]
    fn test_unit_designators_ignored() {
        assert_relative_eq!(similarity("210 Stanton St Apt 4B", "210 Stanton St"), 1.0);
        assert_relative_eq!(similarity("210 Stanton St #4B", "210 Stanton St"), 1.0);
    }

    #[test]
    fn test_matching_house_number_boost() {
        // {12, orchard, st} vs {12, orchard, st, rear}: 3/4 + 0.3 capped at 1.0
        assert_relative_eq!(similarity("12 Orchard St", "12 Orchard St Rear"), 1.0);
        // {12, orchard, st} vs {12, ludlow, st}: 2/4 + 0.3
        assert_relative_eq!(similarity("12 Orchard St", "12 Ludlow St"), 0.8);
    }

    #[test]
    fn test_no_house_number_is_plain_overlap() {
        assert_relative_eq!(similarity("Orchard St", "12 Orchard St"), 2.0 / 3.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn test_house_number_parsing() {
        let parsed = NormalizedAddress::parse("34-12 31st Avenue");
        assert_eq!(parsed.house_number.as_deref(), Some("34-12"));
        assert!(parsed.tokens.contains("31"));
        assert!(parsed.tokens.contains("ave"));
        assert_eq!(NormalizedAddress::parse("Stanton St").house_number, None);
    }

    #[test]
    fn test_matcher_index_agrees_with_full_scan() {
        let records = vec![
            record("123 Main St"),
            record("456 Main St"),
            record("123 Main Street Rear"),
            record("Main St"),
            record("9 Elm Pl"),
        ];
        let matcher = AddressMatcher::new(records.clone());
        let indexed = matcher.matches("123 Main St", 0.6);

        let mut scanned: Vec<(String, f64)> = records
            .iter()
            .map(|r| (r.address.clone(), similarity("123 Main St", &r.address)))
            .filter(|(_, s)| *s > 0.6)
            .collect();
        scanned.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));

        let indexed: Vec<(String, f64)> = indexed
            .into_iter()
            .map(|m| (m.record.address, m.similarity))
            .collect();
        assert_eq!(indexed, scanned);
        assert_eq!(indexed[0].0, "123 Main St");
    }

    #[test]
    fn test_best_match_threshold_is_strict() {
        let matcher = AddressMatcher::new(vec![record("456 Main St")]);
        assert!(matcher.best_match("123 Main St", 0.6).is_none());
        // mismatch scores exactly 0.1, which is not above 0.1
        assert!(matcher.best_match("123 Main St", 0.1).is_none());
        assert!(matcher.best_match("123 Main St", 0.05).is_some());
    }
}
