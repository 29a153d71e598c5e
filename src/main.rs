use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use duobot_core::config::{self, Config};
use duobot_core::routing;
use duobot_core::service::http::{serve, AppState};
use duobot_core::service::sweeper::spawn_sweeper;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "duobot",
    about = "duobot - WhatsApp relay to two generative AI backends",
    version = duobot_core::VERSION,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Load environment variables from this file first
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// Validate configuration and show a summary
    Status {
        /// Load environment variables from this file first
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
    /// Show which backend a message would be routed to
    Route {
        /// Message text
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("duobot=info".parse()?)
                .add_directive("duobot_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, env_file } => cmd_serve(port, env_file).await?,
        Commands::Status { env_file } => cmd_status(env_file)?,
        Commands::Route { message } => cmd_route(message),
    }

    Ok(())
}

// ====== Commands ======

/// Load a dotenv file. An explicit path must exist; otherwise `.env` in the
/// working directory is used when present.
fn load_env(env_file: Option<PathBuf>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

/// Load and validate configuration, exiting with status 1 on failure.
fn load_config_or_exit() -> Config {
    match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_serve(port: Option<u16>, env_file: Option<PathBuf>) -> Result<()> {
    load_env(env_file)?;
    let mut cfg = load_config_or_exit();
    if let Some(port) = port {
        cfg.server.port = port;
    }

    let state = match AppState::from_config(&cfg) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        state.relay.store().clone(),
        state.relay.locks().clone(),
        Duration::from_secs(config::SWEEP_INTERVAL_S),
        Duration::from_secs(config::CONVERSATION_TTL_S),
        cancel.clone(),
    );

    tokio::spawn(shutdown_signal(cancel.clone()));

    let addr = cfg.server.bind_addr();
    println!("duobot v{} listening on {}", duobot_core::VERSION, addr);
    let result = serve(&addr, state, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        error!("Sweeper task failed: {}", e);
    }
    result
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
    token.cancel();
}

fn cmd_status(env_file: Option<PathBuf>) -> Result<()> {
    load_env(env_file)?;

    println!("duobot v{} ({}) Status\n", duobot_core::VERSION, duobot_core::GIT_HASH);

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("Config: ✗ {}", e);
            std::process::exit(1);
        }
    };

    println!("Config: ✓");
    for (key, value) in cfg.summary() {
        println!("  {:<30} {}", key, value);
    }

    let creds = &cfg.vertex.credentials_path;
    println!(
        "Credentials file: {} {}",
        creds.display(),
        if creds.exists() { "✓" } else { "✗" }
    );
    if cfg.vertex.endpoint_id.is_none() {
        println!("Vertex endpoint: not set (visual requests get the fallback reply)");
    }

    Ok(())
}

fn cmd_route(message: Vec<String>) {
    let text = message.join(" ");
    println!("{}", routing::decide(&text));
}
