use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::EngineError;

/// Whether a listing is offered for rent or for sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Rental,
    Sale,
}

/// Point-in-time snapshot of a unit. A new price produces a new `Listing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub address: String,
    pub price: f64,
    pub bedrooms: u32,
    pub bathrooms: f64,
    #[serde(default)]
    pub sqft: Option<u32>,
    #[serde(default)]
    pub built_year: Option<i32>,
    pub neighborhood: String,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    pub property_kind: PropertyKind,
}

impl Listing {
    /// Price divided by bedroom count, studios counting as one bedroom.
    pub fn price_per_bedroom(&self) -> f64 {
        self.price / self.bedrooms.max(1) as f64
    }
}

/// Strictness level of the rule that produced a comparable set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchTier {
    Exact,
    BedBath,
    BedroomOnly,
    Fallback,
}

impl MatchTier {
    /// Strictest first.
    pub const CASCADE: [MatchTier; 4] = [
        MatchTier::Exact,
        MatchTier::BedBath,
        MatchTier::BedroomOnly,
        MatchTier::Fallback,
    ];

    /// Minimum comparables for the tier to be accepted. The fallback tier
    /// takes whatever the pool holds.
    pub fn min_sample(&self) -> Option<usize> {
        match self {
            MatchTier::Exact => Some(3),
            MatchTier::BedBath => Some(8),
            MatchTier::BedroomOnly => Some(12),
            MatchTier::Fallback => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::BedBath => "bedBath",
            MatchTier::BedroomOnly => "bedroomOnly",
            MatchTier::Fallback => "fallback",
        }
    }

    /// Human-readable description used in oracle prompts and summaries
    pub fn describe(&self) -> &'static str {
        match self {
            MatchTier::Exact => "same bedrooms, similar bathrooms and amenities",
            MatchTier::BedBath => "same bedrooms and similar bathrooms",
            MatchTier::BedroomOnly => "same bedroom count",
            MatchTier::Fallback => "all listings in the neighborhood",
        }
    }
}

/// Listings selected as market references for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparableSet {
    pub tier: MatchTier,
    pub comparables: Vec<Listing>,
}

impl ComparableSet {
    pub fn len(&self) -> usize {
        self.comparables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparables.is_empty()
    }

    pub fn mean_price(&self) -> Option<f64> {
        if self.comparables.is_empty() {
            return None;
        }
        Some(self.comparables.iter().map(|l| l.price).sum::<f64>() / self.comparables.len() as f64)
    }
}

/// Three-way pricing classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceClass {
    Undervalued,
    Overvalued,
    Fair,
}

impl PriceClass {
    pub fn to_label(&self) -> &'static str {
        match self {
            PriceClass::Undervalued => "Below market",
            PriceClass::Overvalued => "Above market",
            PriceClass::Fair => "Fairly priced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    ExplicitText,
    RegistryMatch,
    RegistryUnavailable,
    BuildingAge,
    UnitCount,
    RentLevel,
    BuildingType,
}

/// One weighted piece of the stabilization evidence chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub weight: i32,
    pub description: String,
}

impl EvidenceItem {
    pub fn new(kind: EvidenceKind, weight: i32, description: impl Into<String>) -> Self {
        Self {
            kind,
            weight,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizationAssessment {
    /// 0 to 100
    pub probability: u8,
    /// Sorted by descending weight
    pub evidence: Vec<EvidenceItem>,
}

impl StabilizationAssessment {
    pub fn top_evidence(&self) -> Option<&EvidenceItem> {
        self.evidence.first()
    }

    pub fn explanation(&self) -> String {
        match self.top_evidence() {
            Some(item) => format!("{}% likely rent-regulated: {}", self.probability, item.description),
            None => format!("{}% likely rent-regulated", self.probability),
        }
    }
}

/// Weak signal flags the market oracle may attach to an estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleHints {
    #[serde(default)]
    pub luxury_building: Option<bool>,
    #[serde(default)]
    pub estimated_units: Option<u32>,
}

/// Structured output of one oracle call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleEstimate {
    #[serde(default)]
    pub estimated_value: Option<f64>,
    /// The oracle's own discount figure. Logged for comparison, never used.
    #[serde(default)]
    pub reported_discount_percent: Option<f64>,
    #[serde(default, rename = "rawConfidenceHints")]
    pub hints: OracleHints,
}

impl OracleEstimate {
    /// Accept only a finite, positive estimated value
    pub fn validate(self, listing_id: &str) -> Result<Self, EngineError> {
        match self.estimated_value {
            Some(value) if value.is_finite() && value > 0.0 => Ok(self),
            other => Err(EngineError::InvalidEstimate(format!(
                "{:?} for listing {}",
                other, listing_id
            ))),
        }
    }
}

/// One evaluation of one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub listing_id: String,
    pub neighborhood: String,
    pub evaluated_at: DateTime<Utc>,
    pub actual_price: f64,
    pub estimated_market_value: Option<f64>,
    /// Positive means under market
    pub discount_percent: f64,
    pub savings: f64,
    pub classification: PriceClass,
    /// 0 means no signal
    pub confidence: u8,
    pub match_tier: MatchTier,
    pub sample_size: usize,
    pub threshold_percent: f64,
    pub is_undervalued: bool,
    pub stabilization: StabilizationAssessment,
    #[serde(default)]
    pub heuristic_estimate: Option<f64>,
    pub summary: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Why the result carries no signal, when it doesn't
    #[serde(default)]
    pub failure: Option<String>,
}

impl AnalysisResult {
    pub fn has_signal(&self) -> bool {
        self.confidence > 0
    }

    pub fn is_opportunity(&self) -> bool {
        self.is_undervalued && self.has_signal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Pending,
    Analyzed,
    Failed,
    LikelyVacated,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Pending => "pending",
            CacheStatus::Analyzed => "analyzed",
            CacheStatus::Failed => "failed",
            CacheStatus::LikelyVacated => "likely_vacated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CacheStatus::Pending),
            "analyzed" => Some(CacheStatus::Analyzed),
            "failed" => Some(CacheStatus::Failed),
            "likely_vacated" => Some(CacheStatus::LikelyVacated),
            _ => None,
        }
    }
}

/// Persisted freshness state of one listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub listing_id: String,
    pub neighborhood: String,
    pub price: f64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub status: CacheStatus,
    /// Consecutive neighborhood fetches the listing was absent from
    #[serde(default)]
    pub missed_fetches: u32,
}

impl CacheEntry {
    /// New pending entry, filed under the neighborhood key it was fetched by
    pub fn first_sighting(listing: &Listing, neighborhood: &str, now: DateTime<Utc>) -> Self {
        Self {
            listing_id: listing.id.clone(),
            neighborhood: neighborhood.to_string(),
            price: listing.price,
            first_seen_at: now,
            last_seen_at: now,
            last_analyzed_at: None,
            status: CacheStatus::Pending,
            missed_fetches: 0,
        }
    }
}

/// Selection applied by `Store::query_by_neighborhood`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFilter {
    All,
    /// Everything not marked vacated
    Active,
    Status(CacheStatus),
}

impl CacheFilter {
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        match self {
            CacheFilter::All => true,
            CacheFilter::Active => entry.status != CacheStatus::LikelyVacated,
            CacheFilter::Status(status) => entry.status == *status,
        }
    }
}

/// Reference address from a rent-regulation registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub address: String,
    pub jurisdiction_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Published,
    Retracted,
}

impl OpportunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Published => "published",
            OpportunityStatus::Retracted => "retracted",
        }
    }
}

/// User-facing record of an undervalued listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub listing_id: String,
    pub neighborhood: String,
    pub address: String,
    pub price: f64,
    pub estimated_market_value: f64,
    pub discount_percent: f64,
    pub confidence: u8,
    pub stabilization_probability: u8,
    pub status: OpportunityStatus,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Builds a published record. Returns `None` unless the result is a
    /// confident undervalued call.
    pub fn from_result(listing: &Listing, result: &AnalysisResult) -> Option<Self> {
        if !result.is_opportunity() {
            return None;
        }
        Some(Self {
            listing_id: listing.id.clone(),
            neighborhood: listing.neighborhood.clone(),
            address: listing.address.clone(),
            price: listing.price,
            estimated_market_value: result.estimated_market_value?,
            discount_percent: result.discount_percent,
            confidence: result.confidence,
            stabilization_probability: result.stabilization.probability,
            status: OpportunityStatus::Published,
            updated_at: result.evaluated_at,
        })
    }
}

/// One page request against a listing source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn first(page_size: u32) -> Self {
        Self { page: 0, page_size }
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            page_size: self.page_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.page_size as usize
    }
}
