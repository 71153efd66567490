use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sx_hub::config::Config;
use sx_hub::query::TableNames;
use sx_hub::store::clickhouse::ClickHouseProvider;
use sx_hub::store::memory::MemoryStore;
use sx_hub::store::SessionProvider;
use sx_hub::{create_router, AppState, HubError, MetadataService, StoreKind};

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(
    name = "sx-hub",
    version = "0.3.0",
    about = "SEXTANT Metadata Read API"
)]
struct Args {
    /// Server bind address (overrides [server].bind)
    #[arg(long)]
    bind: Option<String>,

    /// Path to config file
    #[arg(long, default_value = "sx-hub.toml")]
    config: PathBuf,

    /// Backing store (overrides `store` in the config file)
    #[arg(long, value_enum)]
    store: Option<StoreKind>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "sx_hub=info,sx_io=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), HubError> {
    let mut config = Config::load(&args.config)?;
    config.apply_env();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(store) = args.store {
        config.store = store;
    }

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| HubError::Config(format!("invalid bind address {:?}: {}", config.server.bind, e)))?;

    let (provider, tables, target): (Arc<dyn SessionProvider>, TableNames, String) = match config.store {
        StoreKind::Clickhouse => {
            let provider = ClickHouseProvider::new(config.clickhouse.clone())?;
            // Startup continues when ClickHouse is down; requests get 503 until it is back.
            if let Err(e) = provider.ping().await {
                tracing::warn!("ClickHouse not reachable at {}: {}", config.clickhouse.url, e);
            }
            (
                Arc::new(provider),
                config.clickhouse.tables(),
                config.clickhouse.url.clone(),
            )
        }
        StoreKind::Memory => {
            let store = MemoryStore::with_cluster(&config.memory.cluster_name);
            if let Some(seed) = &config.memory.seed {
                let rows = store.load_seed(seed)?;
                tracing::info!("Loaded {} seed rows from {:?}", rows, seed);
            }
            (Arc::new(store), TableNames::default(), "in-process".to_string())
        }
    };

    let cluster = match config.store {
        StoreKind::Clickhouse => config.clickhouse.cluster_name.trim(),
        StoreKind::Memory => config.memory.cluster_name.trim(),
    };
    let cluster = if cluster.is_empty() { "none (single node)" } else { cluster };

    let service = MetadataService::new(provider, tables, config.server.stream_buffer);
    let store_kind = service.store_kind();
    let app = create_router(Arc::new(AppState::new(service)));

    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  🧭 SEXTANT v0.3.0");
    tracing::info!("  Metadata:   http://{}/api/v1/metadata", addr);
    tracing::info!("  Status:     http://{}/api/status", addr);
    tracing::info!("  Store:      {} ({})", store_kind, target);
    tracing::info!("  Cluster:    {}", cluster);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
