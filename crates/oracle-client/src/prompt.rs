//! Prompt construction and reply parsing for the LLM oracle.

use crate::error::{OracleError, OracleResult};
use listing_core::{AnalysisResult, ComparableSet, Listing, OracleEstimate, OracleHints};
use serde::Deserialize;
use std::fmt::Write;

pub const ESTIMATE_SYSTEM: &str =
    "You are a residential rental pricing analyst. Output strict JSON only.";

pub const EXPLAIN_SYSTEM: &str =
    "You are a residential rental pricing analyst writing for apartment hunters. Be concise and concrete.";

fn describe_listing(out: &mut String, listing: &Listing) {
    let _ = write!(
        out,
        "id={} address=\"{}\" price=${:.0} beds={} baths={:.1}",
        listing.id, listing.address, listing.price, listing.bedrooms, listing.bathrooms
    );
    if let Some(sqft) = listing.sqft {
        let _ = write!(out, " sqft={}", sqft);
    }
    if let Some(year) = listing.built_year {
        let _ = write!(out, " built={}", year);
    }
    if !listing.amenities.is_empty() {
        let amenities: Vec<&str> = listing.amenities.iter().map(String::as_str).collect();
        let _ = write!(out, " amenities=[{}]", amenities.join(", "));
    }
}

/// Estimate prompt. At most `max_comparables` comparables are listed and the
/// description is cut to `max_description_chars`.
pub fn build_estimate_prompt(
    target: &Listing,
    comparables: &ComparableSet,
    max_comparables: usize,
    max_description_chars: usize,
) -> String {
    let mut prompt = String::from(
        "Estimate the fair monthly market rent of the target apartment from the comparable listings.\n\
         Return ONLY a JSON object: {\"estimatedValue\": number, \"discountPercent\": number, \
         \"luxuryBuilding\": boolean|null, \"estimatedUnits\": integer|null}\n\
         discountPercent is (estimatedValue - price) / estimatedValue * 100.\n\n",
    );

    let _ = writeln!(prompt, "Neighborhood: {}", target.neighborhood);
    prompt.push_str("Target: ");
    describe_listing(&mut prompt, target);
    prompt.push('\n');

    let description: String = target.description.chars().take(max_description_chars).collect();
    if !description.trim().is_empty() {
        let _ = writeln!(prompt, "Description: {}", description.trim());
    }

    let _ = writeln!(
        prompt,
        "\nComparables ({} total, matched on {}):",
        comparables.len(),
        comparables.tier.describe()
    );
    for comparable in comparables.comparables.iter().take(max_comparables) {
        prompt.push_str("- ");
        describe_listing(&mut prompt, comparable);
        prompt.push('\n');
    }
    prompt
}

pub fn build_explain_prompt(
    target: &Listing,
    comparables: &ComparableSet,
    result: &AnalysisResult,
) -> String {
    let mut prompt = String::from(
        "Explain in three to five sentences why this apartment is priced below its market, \
         what a renter should verify, and how reliable the comparison is.\n\n",
    );
    prompt.push_str("Listing: ");
    describe_listing(&mut prompt, target);
    let _ = writeln!(
        prompt,
        "\nEstimated market rent: ${:.0} ({:.1}% below market, confidence {}/100)",
        result.estimated_market_value.unwrap_or_default(),
        result.discount_percent,
        result.confidence
    );
    let _ = writeln!(
        prompt,
        "Comparables: {} listings, matched on {}",
        comparables.len(),
        comparables.tier.describe()
    );
    let _ = writeln!(prompt, "Rent regulation: {}", result.stabilization.explanation());
    if !target.description.trim().is_empty() {
        let _ = writeln!(prompt, "Description: {}", target.description.trim());
    }
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateReply {
    #[serde(alias = "estimated_value", alias = "marketValue")]
    estimated_value: Option<f64>,
    #[serde(default, alias = "discount_percent")]
    discount_percent: Option<f64>,
    #[serde(default, alias = "luxury_building")]
    luxury_building: Option<bool>,
    #[serde(default, alias = "estimated_units")]
    estimated_units: Option<u32>,
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let after_open = trimmed.strip_prefix("```")?;
    let newline = after_open.find('\n')?;
    let body = &after_open[newline + 1..];
    let close = body.rfind("```")?;
    Some(body[..close].trim())
}

fn outer_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Parse the model's reply: bare JSON, fenced JSON, or JSON embedded in
/// prose, in that order.
pub fn parse_estimate(text: &str) -> OracleResult<OracleEstimate> {
    let reply = serde_json::from_str::<EstimateReply>(text.trim())
        .ok()
        .or_else(|| strip_code_fence(text).and_then(|inner| serde_json::from_str(inner).ok()))
        .or_else(|| outer_json_object(text).and_then(|inner| serde_json::from_str(inner).ok()))
        .ok_or_else(|| {
            let preview: String = text.chars().take(120).collect();
            OracleError::InvalidResponse(format!("no estimate JSON in reply: {}", preview))
        })?;

    match reply.estimated_value {
        None => return Err(OracleError::InvalidResponse("reply has no estimatedValue".into())),
        Some(value) if !value.is_finite() || value <= 0.0 => {
            return Err(OracleError::InvalidResponse(format!(
                "estimatedValue must be positive, got {}",
                value
            )));
        }
        Some(_) => {}
    }

    Ok(OracleEstimate {
        estimated_value: reply.estimated_value,
        reported_discount_percent: reply.discount_percent,
        hints: OracleHints {
            luxury_building: reply.luxury_building,
            estimated_units: reply.estimated_units,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing_core::{MatchTier, PropertyKind};

    fn listing(id: &str, price: f64) -> Listing {
        Listing {
            id: id.to_string(),
            address: "301 E 12th St".to_string(),
            price,
            bedrooms: 1,
            bathrooms: 1.0,
            sqft: Some(550),
            built_year: Some(1925),
            neighborhood: "east-village".to_string(),
            amenities: ["laundry".to_string()].into_iter().collect(),
            description: "Rent stabilized one bedroom, heat included.".to_string(),
            property_kind: PropertyKind::Rental,
        }
    }

    #[test]
    fn test_parses_plain_json() {
        let estimate = parse_estimate(
            r#"{"estimatedValue": 3400, "discountPercent": 11.7, "luxuryBuilding": false, "estimatedUnits": 20}"#,
        )
        .unwrap();
        assert_eq!(estimate.estimated_value, Some(3400.0));
        assert_eq!(estimate.reported_discount_percent, Some(11.7));
        assert_eq!(estimate.hints.luxury_building, Some(false));
        assert_eq!(estimate.hints.estimated_units, Some(20));
    }

    #[test]
    fn test_parses_fenced_json() {
        let estimate = parse_estimate("```json\n{\"estimatedValue\": 2950}\n```").unwrap();
        assert_eq!(estimate.estimated_value, Some(2950.0));
        assert_eq!(estimate.hints, OracleHints::default());
    }

    #[test]
    fn test_parses_embedded_json() {
        let estimate =
            parse_estimate("Based on the comps: {\"estimated_value\": 3100.5} is my estimate.").unwrap();
        assert_eq!(estimate.estimated_value, Some(3100.5));
    }

    #[test]
    fn test_rejects_reply_without_estimate() {
        assert!(matches!(
            parse_estimate("I cannot estimate this listing."),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_estimate(r#"{"discountPercent": 10}"#),
            Err(OracleError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_estimate() {
        for reply in [
            r#"{"estimatedValue": -3400}"#,
            r#"{"estimatedValue": 0}"#,
            "```json\n{\"estimatedValue\": -1.5}\n```",
        ] {
            assert!(matches!(
                parse_estimate(reply),
                Err(OracleError::InvalidResponse(_))
            ));
        }
    }

    #[test]
    fn test_estimate_prompt_limits_comparables() {
        let target = listing("T", 3000.0);
        let comparables = ComparableSet {
            tier: MatchTier::BedroomOnly,
            comparables: (0..40).map(|i| listing(&format!("C{i:02}"), 3200.0)).collect(),
        };
        let prompt = build_estimate_prompt(&target, &comparables, 10, 20);
        assert!(prompt.contains("Comparables (40 total, matched on same bedroom count)"));
        assert_eq!(prompt.matches("\n- id=").count(), 10);
        assert!(prompt.contains("Description: Rent stabilized one"));
        assert!(!prompt.contains("heat included"));
    }
}
