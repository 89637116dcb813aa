use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use jsondb::config::{Config, LogConfig};
use jsondb::server::Server;
use jsondb::{Options, Store, VERSION};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// JSON document store served over RESP
#[derive(Debug, Parser)]
#[command(name = "jsondb", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Root directory for collections (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Listening address (overrides the config file)
    #[arg(long)]
    addr: Option<String>,
}

fn init_logging(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .with_context(|| format!("invalid log level '{}'", log.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match &log.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(addr) = cli.addr {
        config.server_addr = addr;
    }
    config.validate()?;

    init_logging(&config.log)?;

    info!("Starting jsondb - JSON document store");
    info!("Version: {}", VERSION);

    // Store events go to the same sink as the rest of the process
    let logger = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    let options = Options::default()
        .with_logger(logger)
        .sweep_temp_files(config.sweep_temp_files);
    let store = Store::open(&config.data_dir, options)
        .with_context(|| format!("failed to open store at '{}'", config.data_dir.display()))?;
    info!("Data directory: {}", store.root().display());

    let server = Arc::new(Server::bind(&config.server_addr, Arc::new(store)).await?);
    info!("Server listening on: {}", server.local_addr());

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                // no Ctrl-C handler, serve until killed
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
