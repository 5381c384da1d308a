use anyhow::{bail, Context, Result};
use listing_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use valuation_engine::EngineConfig;
use valuation_orchestrator::OrchestratorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Scan scope
    pub neighborhoods: Vec<String>,
    pub scan_interval_seconds: u64,     // 3600 (hourly)
    pub page_size: u32,                 // 100

    // Data
    pub listings_dir: String,
    pub registry_path: String,
    pub database_url: String,
    pub dry_run: bool,                  // in-memory store, nothing persisted

    // Oracle
    pub oracle_backend: String,         // "llm" or "heuristic"
    pub oracle_delay_ms: u64,           // 500
    pub max_concurrent_oracle_calls: usize,
    pub reasoning_enabled: bool,

    // Decision thresholds
    pub base_threshold_percent: f64,            // 15%
    pub low_inventory_threshold_percent: f64,   // 10%
    pub inventory_breakpoint: usize,            // 200 active listings
    pub registry_match_threshold: f64,          // 0.6

    // Cache
    pub vacate_after_misses: u32,
    pub reanalyze_after_days: i64,      // 0 disables
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, falling back to defaults for missing keys.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            neighborhoods: var("NEIGHBORHOODS", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            scan_interval_seconds: var("SCAN_INTERVAL", "3600")
                .parse()
                .context("SCAN_INTERVAL must be a number of seconds")?,
            page_size: var("PAGE_SIZE", "100").parse().context("PAGE_SIZE")?,

            listings_dir: var("LISTINGS_DIR", "data/listings"),
            registry_path: var("REGISTRY_PATH", "data/registry.json"),
            database_url: var("DATABASE_URL", "sqlite:listings.db"),
            dry_run: var("DRY_RUN", "false").parse().context("DRY_RUN")?,

            oracle_backend: var("ORACLE_BACKEND", "llm").to_lowercase(),
            oracle_delay_ms: var("ORACLE_DELAY_MS", "500").parse().context("ORACLE_DELAY_MS")?,
            max_concurrent_oracle_calls: var("MAX_CONCURRENT_ORACLE_CALLS", "1")
                .parse()
                .context("MAX_CONCURRENT_ORACLE_CALLS")?,
            reasoning_enabled: var("ENABLE_REASONING", "true")
                .parse()
                .context("ENABLE_REASONING")?,

            base_threshold_percent: var("BASE_THRESHOLD_PERCENT", "15.0")
                .parse()
                .context("BASE_THRESHOLD_PERCENT")?,
            low_inventory_threshold_percent: var("LOW_INVENTORY_THRESHOLD_PERCENT", "10.0")
                .parse()
                .context("LOW_INVENTORY_THRESHOLD_PERCENT")?,
            inventory_breakpoint: var("INVENTORY_BREAKPOINT", "200")
                .parse()
                .context("INVENTORY_BREAKPOINT")?,
            registry_match_threshold: var("REGISTRY_MATCH_THRESHOLD", "0.6")
                .parse()
                .context("REGISTRY_MATCH_THRESHOLD")?,

            vacate_after_misses: var("VACATE_AFTER_MISSES", "1")
                .parse()
                .context("VACATE_AFTER_MISSES")?,
            reanalyze_after_days: var("REANALYZE_AFTER_DAYS", "14")
                .parse()
                .context("REANALYZE_AFTER_DAYS")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.neighborhoods.is_empty() {
            bail!("NEIGHBORHOODS must list at least one neighborhood");
        }
        if self.scan_interval_seconds == 0 {
            bail!("SCAN_INTERVAL must be positive");
        }
        if self.page_size == 0 {
            bail!("PAGE_SIZE must be positive");
        }
        if self.max_concurrent_oracle_calls == 0 {
            bail!("MAX_CONCURRENT_ORACLE_CALLS must be at least 1");
        }
        if !matches!(self.oracle_backend.as_str(), "llm" | "heuristic") {
            bail!("ORACLE_BACKEND must be 'llm' or 'heuristic', got '{}'", self.oracle_backend);
        }
        for (name, value) in [
            ("BASE_THRESHOLD_PERCENT", self.base_threshold_percent),
            ("LOW_INVENTORY_THRESHOLD_PERCENT", self.low_inventory_threshold_percent),
        ] {
            if !(value > 0.0 && value < 100.0) {
                bail!("{} must be between 0 and 100, got {}", name, value);
            }
        }
        if self.low_inventory_threshold_percent > self.base_threshold_percent {
            bail!("LOW_INVENTORY_THRESHOLD_PERCENT must not exceed BASE_THRESHOLD_PERCENT");
        }
        if !(self.registry_match_threshold > 0.0 && self.registry_match_threshold <= 1.0) {
            bail!("REGISTRY_MATCH_THRESHOLD must be in (0, 1]");
        }
        if self.vacate_after_misses == 0 {
            bail!("VACATE_AFTER_MISSES must be at least 1");
        }
        if self.reanalyze_after_days < 0 {
            bail!("REANALYZE_AFTER_DAYS must not be negative");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            base_threshold_percent: self.base_threshold_percent,
            low_inventory_threshold_percent: self.low_inventory_threshold_percent,
            inventory_breakpoint: self.inventory_breakpoint,
            registry_match_threshold: self.registry_match_threshold,
            ..EngineConfig::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            vacate_after_misses: self.vacate_after_misses,
            reanalyze_after: (self.reanalyze_after_days > 0)
                .then(|| chrono::Duration::days(self.reanalyze_after_days)),
            ..CacheConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            neighborhoods: self.neighborhoods.clone(),
            page_size: self.page_size,
            inter_call_delay: Duration::from_millis(self.oracle_delay_ms),
            max_concurrent_oracle_calls: self.max_concurrent_oracle_calls,
            reasoning_enabled: self.reasoning_enabled,
            ..OrchestratorConfig::default()
        }
    }
}
