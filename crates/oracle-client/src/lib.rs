pub mod error;
pub mod heuristic;
pub mod llm;
pub mod prompt;
pub mod retry;

pub use error::{OracleError, OracleResult};
pub use heuristic::HeuristicOracle;
pub use llm::LlmMarketOracle;
pub use retry::RetryingOracle;

use std::time::Duration;

/// Configuration for the market oracle
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub max_explain_tokens: u32,
    pub max_prompt_comparables: usize,
    pub max_description_chars: usize,
    pub max_attempts: u32,
    /// Doubled after every failed attempt
    pub initial_backoff: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("ORACLE_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            api_key: std::env::var("ORACLE_API_KEY")
                .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
                .ok(),
            model: std::env::var("ORACLE_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ORACLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            max_tokens: 300,
            max_explain_tokens: 600,
            max_prompt_comparables: 25,
            max_description_chars: 1500,
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Wrap an oracle with the configured retry policy
pub fn with_retry<O: listing_core::MarketOracle>(oracle: O, config: &OracleConfig) -> RetryingOracle<O> {
    RetryingOracle::new(oracle, config.max_attempts, config.initial_backoff)
}
