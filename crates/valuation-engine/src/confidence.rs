//! Confidence scoring.
//!
//! Confidence is a function of two numbers only: which comparable tier was
//! used and how many comparables it held. The result feeds the user-facing
//! reliability figure, so every step is additive and easy to explain.

use listing_core::MatchTier;

pub const MIN_CONFIDENCE: u8 = 30;
pub const MAX_CONFIDENCE: u8 = 95;

pub fn base_confidence(tier: MatchTier) -> i32 {
    match tier {
        MatchTier::Exact => 90,
        MatchTier::BedBath => 80,
        MatchTier::BedroomOnly => 70,
        MatchTier::Fallback => 60,
    }
}

/// Sample-size adjustment. The small-sample penalty only applies when the
/// sample also falls short of the tier's own acceptance floor; a tier that
/// was accepted on its own minimum is not penalised again.
pub fn sample_adjustment(tier: MatchTier, sample_size: usize) -> i32 {
    if sample_size >= 20 {
        5
    } else if sample_size >= 15 {
        3
    } else if sample_size >= 10 {
        1
    } else if sample_size < 5 && tier.min_sample().map_or(true, |min| sample_size < min) {
        -10
    } else {
        0
    }
}

/// Confidence in [`MIN_CONFIDENCE`, `MAX_CONFIDENCE`].
pub fn score(tier: MatchTier, sample_size: usize) -> u8 {
    let raw = base_confidence(tier) + sample_adjustment(tier, sample_size);
    raw.clamp(MIN_CONFIDENCE as i32, MAX_CONFIDENCE as i32) as u8
}

/// One-line account of how the score was reached
pub fn explain(tier: MatchTier, sample_size: usize) -> String {
    let adjustment = sample_adjustment(tier, sample_size);
    format!(
        "{} tier base {} {:+} for {} comparables = {}",
        tier.label(),
        base_confidence(tier),
        adjustment,
        sample_size,
        score(tier, sample_size)
    )
}
