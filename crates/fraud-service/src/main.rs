use clap::{Parser, ValueEnum};
use fraud_core::ScoringConfig;
use fraud_service::{build_router, ServiceConfig, ServiceState, ServiceStorageConfig};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "fraud-screend", version, about = "Pre-transaction fraud screening service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8090
    #[arg(long, default_value = "127.0.0.1:8090")]
    listen: SocketAddr,
    /// Review queue and feedback persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "FRAUD_STORAGE")]
    storage: StorageMode,
    /// PostgreSQL url for review queue and feedback persistence.
    #[arg(long, env = "FRAUD_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "FRAUD_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Path to a TOML file overriding the default scoring configuration.
    #[arg(long, env = "FRAUD_CONFIG")]
    config: Option<String>,
    /// Directory containing per-detector model coefficient files.
    #[arg(long, env = "FRAUD_MODEL_DIR")]
    model_dir: Option<String>,
    /// Use the deterministic fixture models instead of loading from `model_dir`.
    #[arg(long, default_value_t = false)]
    fixture_models: bool,
    /// Disable human-in-the-loop review routing entirely.
    #[arg(long, default_value_t = false)]
    no_hitl: bool,
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<ServiceStorageConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.storage {
        StorageMode::Memory => ServiceStorageConfig::Memory,
        StorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("storage=postgres requires --database-url or DATABASE_URL")
            })?;
            ServiceStorageConfig::Postgres {
                database_url,
                max_connections: cli.pg_max_connections,
            }
        }
        StorageMode::Auto => match resolved_url {
            Some(database_url) => ServiceStorageConfig::Postgres {
                database_url,
                max_connections: cli.pg_max_connections,
            },
            None => ServiceStorageConfig::Memory,
        },
    };

    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fraud_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let storage = resolve_storage(&cli)?;

    let mut scoring = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config file {path}: {e}"))?;
            ScoringConfig::from_toml_str(&raw)?
        }
        None => ScoringConfig::default(),
    };
    if let Some(model_dir) = &cli.model_dir {
        scoring.model_dir = model_dir.clone();
    }
    if cli.no_hitl {
        scoring.hitl_enabled = false;
    }

    let config = ServiceConfig {
        scoring,
        storage,
        use_fixture_models: cli.fixture_models,
    };
    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("fraud-service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
