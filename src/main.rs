use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repairshop::auth::AuthService;
use repairshop::config::Config;
use repairshop::db::{DatabasePools, Dataset};
use repairshop::gateway::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Repair-shop backend: accounts, invites and the main/demo datasets.
#[derive(Parser, Debug)]
#[command(name = "repairshop", version, about)]
struct Cli {
    /// Config file (default: ~/.repairshop/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create both dataset databases and print their user counts
    InitDb,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("repairshop=info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let pools = DatabasePools::open(&config.database)?;
            let state = AppState {
                auth: Arc::new(AuthService::new(pools, &config.invite)),
            };
            gateway::run_gateway(&config.gateway, state).await
        }
        Commands::InitDb => {
            let pools = DatabasePools::open(&config.database)?;
            let service = AuthService::new(pools, &config.invite);
            for dataset in Dataset::ALL {
                let count = service.store(dataset).user_count()?;
                println!("{dataset}: {count} user(s)");
            }
            Ok(())
        }
    }
}
