use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use api_server::{ApiConfig, ApiServer};
use catalog::{BuiltinRegistry, Catalog, ProviderRegistry, RegistrySync, SyncEngine, SyncOptions};
use runtime::{AppConfig, CliArgs, ServerConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Starmap Server - model catalog API with real-time change streaming
#[derive(Parser)]
#[command(name = "starmap-server")]
#[command(about = "Starmap Server - model catalog API with real-time change streaming")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::logging::init_logging(&logging_config, Path::new("."));
    tracing::info!("Starmap Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config).await,
    }
}

fn api_config(server: &ServerConfig) -> ApiConfig {
    ApiConfig {
        host: server.host.clone(),
        port: server.port,
        path_prefix: server.path_prefix.clone(),
        cors_enabled: server.cors_enabled,
        cors_origins: server.cors_origins.clone(),
        auth_enabled: server.auth_enabled,
        auth_header: server.auth_header.clone(),
        auth_key: server.auth_key.clone(),
        rate_limit: server.rate_limit,
        cache_ttl: server.cache_ttl,
        read_timeout: server.read_timeout,
        write_timeout: server.write_timeout,
        idle_timeout: server.idle_timeout,
        metrics_enabled: server.metrics_enabled,
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    // Seed the catalog before serving; server hooks are not installed yet,
    // so the initial load publishes nothing.
    let catalog = Arc::new(Catalog::new());
    let registry: Arc<dyn ProviderRegistry> = Arc::new(BuiltinRegistry);
    let sync = Arc::new(RegistrySync::new(registry, catalog.clone()));
    let report = sync.sync(SyncOptions::default()).await?;
    tracing::info!(
        models = catalog.model_count(),
        providers = catalog.provider_count(),
        changes = report.total_changes,
        "catalog loaded"
    );

    let server = ApiServer::new(api_config(&config.server), catalog, sync);
    server.start();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("failed to bind {}: {}", addr, e))?;

    let serve = server.serve(listener);
    tokio::pin!(serve);

    tokio::select! {
        res = &mut serve => {
            res?;
            server.shutdown().await;
        }
        _ = runtime::wait_for_shutdown() => {
            tracing::info!("shutdown signal received");
            server.shutdown().await;
            // bounded drain: do not wait for long-lived clients beyond this
            if tokio::time::timeout(Duration::from_secs(5), &mut serve)
                .await
                .is_err()
            {
                tracing::warn!("http server did not drain in time");
            }
        }
    }

    tracing::info!("Starmap Server stopped");
    Ok(())
}

async fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    addr.to_socket_addrs()
        .map_err(|e| anyhow!("invalid bind address '{}': {}", addr, e))?;

    if config.server.auth_enabled && config.server.auth_key.trim().is_empty() {
        return Err(anyhow!("auth_enabled requires a non-empty auth_key"));
    }

    println!("Configuration check passed");
    println!("Server config:");
    println!("{}", config.to_yaml()?);

    Ok(())
}
