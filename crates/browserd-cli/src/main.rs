use std::sync::Arc;

use clap::{Parser, Subcommand};

use browserd_cli::serve::{self, ServeState};
use browserd_core::config::Config;
use browserd_engine::HttpEngine;
use browserd_registry::{ResourceStore, SessionRegistry};
use browserd_tools::ToolRegistry;
use browserd_usage::{ReplayFetch, UsageMeter, UsageReplayFetcher};

#[derive(Parser)]
#[command(
    name = "browserd",
    about = "Broker for remote browser-automation sessions with per-session usage metering",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broker, serving newline-delimited JSON requests on stdin
    Serve,

    /// Show broker version and configuration summary
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    // Initialize logging: -v wins, then the config's level, then info.
    let filter = if cli.verbose {
        "debug"
    } else {
        config.log_level().unwrap_or("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Serve => {
            let config = Arc::new(config);
            let engine_cfg = config.engine();

            let engine = Arc::new(HttpEngine::from_config(&engine_cfg)?);
            let meter = Arc::new(UsageMeter::new());
            let resources = Arc::new(ResourceStore::in_memory());
            let replay = UsageReplayFetcher::from_config(&config.replay(), &engine_cfg)
                .map(|f| Arc::new(f) as Arc<dyn ReplayFetch>);
            let registry = Arc::new(SessionRegistry::new(
                engine,
                Arc::clone(&resources),
                Arc::clone(&meter),
                replay,
            ));

            let state = Arc::new(ServeState {
                config,
                registry: Arc::clone(&registry),
                meter,
                resources,
                tools: ToolRegistry::with_builtins(),
            });

            tracing::info!("browserd serving on stdio");
            tokio::select! {
                result = serve::run(Arc::clone(&state)) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }

            // Release any remote sessions still live before exit.
            for id in registry.active_session_ids().await {
                registry.cleanup_session(&id).await;
            }
        }
        Commands::Status => {
            println!("browserd v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!(
                "Engine: {}",
                if config.engine().api_key.is_some() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            println!(
                "Replay accounting: {}",
                if config.replay().enabled { "enabled" } else { "disabled" }
            );
            println!(
                "Server binding: {}:{}",
                config.server_host(),
                config.server_port()
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}
