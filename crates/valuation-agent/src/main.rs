use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use listing_cache::{ListingCache, MemoryStore, SqliteStore};
use listing_core::{MarketOracle, Store};
use oracle_client::{HeuristicOracle, LlmMarketOracle, OracleConfig};
use tokio::signal::unix::SignalKind;
use tokio::time;
use valuation_orchestrator::{JsonDirListingSource, JsonFileRegistry, ValuationOrchestrator};

mod config;

use config::AgentConfig;

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_oracle(config: &AgentConfig) -> Result<Arc<dyn MarketOracle>> {
    let oracle_config = OracleConfig::default();
    let oracle: Arc<dyn MarketOracle> = match config.oracle_backend.as_str() {
        "heuristic" => Arc::new(HeuristicOracle),
        _ => {
            let llm = LlmMarketOracle::new(oracle_config.clone())
                .context("LLM oracle needs ORACLE_API_KEY (or set ORACLE_BACKEND=heuristic)")?;
            tracing::info!("  Oracle model: {} ({})", oracle_config.model, oracle_config.base_url);
            Arc::new(oracle_client::with_retry(llm, &oracle_config))
        }
    };
    Ok(oracle)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();
    init_tracing();

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let run_once = std::env::args().any(|arg| arg == "--once");

    tracing::info!("Starting listing valuation agent");

    // 2. Load configuration
    let config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Neighborhoods: {}", config.neighborhoods.join(", "));
    tracing::info!("  Scan interval: {} seconds", config.scan_interval_seconds);
    tracing::info!(
        "  Threshold: {}% ({}% below {} active listings)",
        config.base_threshold_percent,
        config.low_inventory_threshold_percent,
        config.inventory_breakpoint
    );
    tracing::info!(
        "  Oracle: {} (max {} concurrent, {}ms between calls)",
        config.oracle_backend,
        config.max_concurrent_oracle_calls,
        config.oracle_delay_ms
    );

    // 3. Storage
    let (store, db): (Arc<dyn Store>, Option<Arc<SqliteStore>>) = if config.dry_run {
        tracing::warn!("Dry run: results are kept in memory only");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let db = Arc::new(
            SqliteStore::connect(&config.database_url)
                .await
                .with_context(|| format!("opening {}", config.database_url))?,
        );
        (db.clone(), Some(db))
    };
    let cache = Arc::new(ListingCache::new(store, config.cache_config()));

    // 4. Collaborators
    let oracle = build_oracle(&config)?;
    let orchestrator = ValuationOrchestrator::new(
        Arc::new(JsonDirListingSource::new(&config.listings_dir)),
        oracle,
        Arc::new(JsonFileRegistry::new(&config.registry_path)),
        cache,
        config.engine_config(),
        config.orchestrator_config(),
    );
    tracing::info!("Valuation orchestrator initialized");

    if run_once {
        run_cycle(&orchestrator, db.as_deref()).await;
        return Ok(());
    }

    // 5. Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut interval = time::interval(Duration::from_secs(config.scan_interval_seconds));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycles += 1;
                tracing::info!("Starting scan cycle #{}", cycles);
                run_cycle(&orchestrator, db.as_deref()).await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    tracing::info!("Valuation agent shut down after {} cycles.", cycles);
    Ok(())
}

async fn run_cycle(orchestrator: &ValuationOrchestrator, db: Option<&SqliteStore>) {
    let stats = orchestrator.run_batch().await;
    match serde_json::to_string(&stats) {
        Ok(json) => tracing::debug!("Run stats: {}", json),
        Err(e) => tracing::debug!("Could not serialize run stats: {}", e),
    }

    let Some(db) = db else {
        return;
    };
    match db.published_opportunities().await {
        Ok(opportunities) => {
            tracing::info!("{} published opportunities", opportunities.len());
            for opportunity in opportunities.iter().take(5) {
                tracing::info!(
                    "  {} {} ${:.0} ({:.1}% below market, confidence {}, {}% likely stabilized)",
                    opportunity.neighborhood,
                    opportunity.address,
                    opportunity.price,
                    opportunity.discount_percent,
                    opportunity.confidence,
                    opportunity.stabilization_probability
                );
            }
        }
        Err(e) => tracing::warn!("Failed to list published opportunities: {}", e),
    }
}
