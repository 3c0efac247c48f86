use anyhow::Result;
use clap::{Parser, Subcommand};
use hivepool::api::{create_router, AppState};
use hivepool::{create_pool, DatabaseConfig, Settings};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hivepool")]
#[command(about = "Self-optimizing agent pool with a realtime broadcast hub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pool and the HTTP/WebSocket server
    Serve {
        #[arg(short, long, env = "HIVEPOOL_PORT", default_value = "8000")]
        port: u16,
        #[arg(long, env = "HIVEPOOL_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Comma-separated names of agents created at startup
        #[arg(long, default_value = "Alpha,Beta,Gamma")]
        initial_agents: String,
    },
    /// Initialize the database schema and exit
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("hivepool=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_url,
            initial_agents,
        } => {
            let mut settings = Settings::default();
            settings.server.host = host;
            settings.server.port = port;

            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url: {}", db_config.url);

            let pool = create_pool(settings.clone(), db_config).await?;
            pool.start().await;

            for name in initial_agents.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match pool.create_agent(name, "HyperAgent").await {
                    Ok(agent_id) => info!(name, agent_id = %agent_id, "created initial agent"),
                    Err(err) => tracing::warn!(name, error = %err, "could not create initial agent"),
                }
            }

            let state = AppState {
                pool: pool.clone(),
                settings: Arc::new(settings.clone()),
            };
            let app = create_router(state);

            let bind = format!("{}:{}", settings.server.host, settings.server.port);
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            pool.shutdown().await;
            pool.hub().shutdown().await;
            info!("Shutdown complete");
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = hivepool::create_connection(db_config).await?;
            hivepool::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
