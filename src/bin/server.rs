//! Runs the `http` facade (spec.md §6.1). Grounded on the teacher's
//! `server/mod.rs::start_server` for the bind/serve shape, minus the
//! WebSocket dispatcher machinery that has no counterpart in this spec's
//! plain REST table.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, Level};

use prefixcollate::adapters::{BgpAdapter, IrrAdapter, RirStatsAdapter};
use prefixcollate::config::AppConfig;
use prefixcollate::http::{router, AppState};
use prefixcollate::{Collector, PrefixFloor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let irr = IrrAdapter::new(config.irrd_endpoint.clone());
    let irr_for_sets = Arc::new(IrrAdapter::new(config.irrd_endpoint.clone()));
    let bgp = BgpAdapter::new(pool.clone(), config.max_query_results);
    let rirstats = RirStatsAdapter::new(pool);
    let floor = PrefixFloor {
        ipv4: config.minimum_prefix_size_ipv4,
        ipv6: config.minimum_prefix_size_ipv6,
    };
    let collector = Arc::new(Collector::new(irr, bgp, rirstats, floor));

    let cache = prefixcollate::cache::build(config.redis_url.as_deref()).await?;

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState {
        collector,
        irr: irr_for_sets,
        cache,
        config,
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "prefixcollate-server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
