use async_trait::async_trait;
use listing_core::{AnalysisResult, ComparableSet, EngineError, Listing, MarketOracle, OracleEstimate};
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::prompt;
use crate::OracleConfig;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Market oracle backed by a messages-style LLM endpoint
#[derive(Clone)]
pub struct LlmMarketOracle {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: String,
}

impl LlmMarketOracle {
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(OracleError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn complete(&self, system: &str, user_prompt: String, max_tokens: u32) -> OracleResult<String> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            temperature: 0.0,
            system,
            messages: vec![Message {
                role: "user",
                content: user_prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { OracleError::Timeout } else { OracleError::RequestFailed(e) })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(OracleError::RateLimited);
            }
            if status.is_server_error() {
                return Err(OracleError::ServiceUnavailable(format!("Status: {} {}", status, preview)));
            }
            return Err(OracleError::InvalidResponse(format!("Status: {} {}", status, preview)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&response.text().await?)?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| OracleError::InvalidResponse("reply has no text content".into()))
    }

    pub async fn request_estimate(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
    ) -> OracleResult<OracleEstimate> {
        let user_prompt = prompt::build_estimate_prompt(
            target,
            comparables,
            self.config.max_prompt_comparables,
            self.config.max_description_chars,
        );
        let text = self
            .complete(prompt::ESTIMATE_SYSTEM, user_prompt, self.config.max_tokens)
            .await?;
        let estimate = prompt::parse_estimate(&text)?;
        tracing::debug!(
            "Oracle estimate for {}: {:?} ({} comparables, {})",
            target.id,
            estimate.estimated_value,
            comparables.len(),
            comparables.tier.label()
        );
        Ok(estimate)
    }

    pub async fn request_explanation(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
        result: &AnalysisResult,
    ) -> OracleResult<String> {
        let user_prompt = prompt::build_explain_prompt(target, comparables, result);
        let text = self
            .complete(prompt::EXPLAIN_SYSTEM, user_prompt, self.config.max_explain_tokens)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(OracleError::InvalidResponse("empty explanation".into()));
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl MarketOracle for LlmMarketOracle {
    async fn estimate(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
    ) -> Result<OracleEstimate, EngineError> {
        self.request_estimate(target, comparables)
            .await
            .map_err(EngineError::from)
    }

    async fn explain(
        &self,
        target: &Listing,
        comparables: &ComparableSet,
        result: &AnalysisResult,
    ) -> Result<String, EngineError> {
        self.request_explanation(target, comparables, result)
            .await
            .map_err(EngineError::from)
    }

    fn backend_name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = OracleConfig {
            api_key: None,
            ..OracleConfig::default()
        };
        assert!(matches!(LlmMarketOracle::new(config), Err(OracleError::MissingApiKey)));

        let blank = OracleConfig {
            api_key: Some("  ".to_string()),
            ..OracleConfig::default()
        };
        assert!(matches!(LlmMarketOracle::new(blank), Err(OracleError::MissingApiKey)));
    }

    #[test]
    fn test_builds_with_api_key() {
        let config = OracleConfig {
            api_key: Some("test-key".to_string()),
            ..OracleConfig::default()
        };
        let oracle = LlmMarketOracle::new(config).unwrap();
        assert_eq!(oracle.backend_name(), "llm");
    }

    #[test]
    fn test_response_text_block() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"{\"estimatedValue\": 3000}"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        assert_eq!(parsed.content[0].kind, "text");
        assert!(prompt::parse_estimate(&parsed.content[0].text).is_ok());
    }
}
