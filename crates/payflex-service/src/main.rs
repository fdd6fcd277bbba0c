use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use payflex_config::ConfigLoader;
use payflex_service::{api, factories::build_engine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "payflex-gateway")]
#[command(about = "Payflex payment gateway service", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/gateway.toml")]
	config: PathBuf,

	#[arg(long, env = "PAYFLEX_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the HTTP server and the scheduled sweeper
	Start,
	/// Validate the configuration file
	Validate,
	/// Run one sweep pass and exit
	Sweep {
		/// Include orders younger than the new-order window
		#[arg(long)]
		all: bool,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(&cli.config).await,
		Some(Commands::Validate) => validate_config(&cli.config).await,
		Some(Commands::Sweep { all }) => sweep_once(&cli.config, all).await,
	}
}

async fn start_service(config_path: &Path) -> Result<()> {
	info!("Starting Payflex gateway");
	info!("Loading configuration from: {:?}", config_path);

	let config = ConfigLoader::new()
		.with_file(config_path)
		.load()
		.await
		.context("Failed to load configuration")?;

	let host = config.gateway.http_host.clone();
	let port = config.gateway.http_port;
	let engine = Arc::new(build_engine(config).context("Failed to build gateway engine")?);

	let (shutdown_tx, _) = broadcast::channel(1);

	let scheduled = {
		let engine = engine.clone();
		let shutdown = shutdown_tx.subscribe();
		tokio::spawn(async move { engine.run_scheduled(shutdown).await })
	};

	let server = {
		let engine = engine.clone();
		let mut shutdown = shutdown_tx.subscribe();
		tokio::spawn(async move {
			api::serve(engine, &host, port, async move {
				let _ = shutdown.recv().await;
			})
			.await
		})
	};

	info!("Payflex gateway started");

	setup_shutdown_signal().await;
	info!("Shutdown signal received, stopping services...");
	let _ = shutdown_tx.send(());

	if let Err(e) = scheduled.await {
		error!(error = %e, "Scheduled task ended abnormally");
	}
	server
		.await
		.context("HTTP server task failed")?
		.context("HTTP server failed")?;

	info!("Payflex gateway stopped");
	Ok(())
}

async fn validate_config(config_path: &Path) -> Result<()> {
	info!("Validating configuration file: {:?}", config_path);

	let config = ConfigLoader::new()
		.with_file(config_path)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Gateway name: {}", config.gateway.name);
	info!("Provider environment: {}", config.provider.environment);
	info!("Storage backend: {}", config.storage.backend);
	info!("Order store backend: {}", config.orders.backend);
	info!(
		"Sweeper: enabled={} interval={}s",
		config.sweeper.enabled, config.sweeper.interval_secs
	);
	if config.provider.client_id.is_empty() || config.provider.client_secret.is_empty() {
		info!("Provider credentials not set; the payment option will be hidden");
	}

	Ok(())
}

/// One-shot pass for an external scheduler.
async fn sweep_once(config_path: &Path, all: bool) -> Result<()> {
	let config = ConfigLoader::new()
		.with_file(config_path)
		.load()
		.await
		.context("Failed to load configuration")?;

	let engine = build_engine(config).context("Failed to build gateway engine")?;
	let report = engine.sweep(all).await.context("Sweep failed")?;
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!(error = %e, "Failed to install SIGTERM handler");
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
}
