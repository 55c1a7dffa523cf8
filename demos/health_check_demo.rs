//! Health Check Demo Application
//!
//! Pings the configured Redis server, classifies the latency and prints the
//! cache statistics report.
//!
//! Usage:
//!   cargo run --example health_check_demo
//!
//! Environment variables:
//!   REDIS_URL      - Connection URL (overrides the variables below)
//!   REDIS_HOST     - Redis host (default: localhost)
//!   REDIS_PORT     - Redis port (default: 6379)
//!   REDIS_DB       - Database index (default: 0)
//!   REDIS_PASSWORD - Password (optional)
//!   REDIS_TIMEOUT  - Command timeout in seconds (default: 3)

use ouroboros_cache::{NamespacedCache, RedisConfig, RedisStore, StatsReporter};
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("=== Redis Health Check Demo ===");

    let config = RedisConfig::from_env()?;

    // Lazy: an unreachable server shows up as Unhealthy below
    let store = Arc::new(RedisStore::open(config.clone())?);
    let cache = NamespacedCache::with_defaults(store);

    info!("\n--- Health Check (PING) ---");
    let reporter = StatsReporter::new(&cache).with_redis_config(&config);
    let health = reporter.health_check().await;
    info!("Status: {:?}", health.status);
    info!("Response time: {}ms", health.response_time_ms);
    info!("Operational: {}", health.status.is_operational());
    info!("HTTP status code: {}", health.status.to_http_status_code());
    if let Some(error) = &health.error {
        info!("Error: {}", error);
    }

    info!("\n--- Degraded State Demo ---");
    // Zero threshold: any measurable latency counts as degraded
    let strict = StatsReporter::new(&cache).with_degraded_threshold(0);
    let strict_health = strict.health_check().await;
    info!("Status with 0ms threshold: {:?}", strict_health.status);

    info!("\n--- Statistics ---");
    match reporter.get_stats().await {
        Ok(report) => {
            info!("Keys: {}", report.total_keys);
            info!("Memory: {}", report.used_memory_human);
            info!("Uptime: {}s", report.uptime_seconds);
            info!("Clients: {}", report.connection.connected_clients);
        }
        Err(e) => info!("Statistics unavailable: {}", e),
    }

    info!("\n--- JSON Serialization Demo ---");
    let json = serde_json::to_string_pretty(&health)?;
    info!("HealthCheckResult as JSON:\n{}", json);

    info!("\n=== Demo Complete ===");

    Ok(())
}
